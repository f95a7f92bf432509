//! Integration tests for the atlex library and CLI.
//!
//! These tests validate end-to-end workflows that span multiple modules:
//! reader pipelines over synthetic granules, indexer pools over directory
//! stores, and the CLI commands through the built binary.

mod helpers;
mod test_cli_commands;
mod test_extract_scenarios;
mod test_indexer_pool;
mod test_reader_stream;
