//! Resource name to storage URL mapping.
//!
//! The asset-resolution subsystem proper is an external collaborator; the
//! pipelines only need its contract: compose `<format>://<url>/<resource>`
//! for a named resource, and find the companion ATL08 classification file
//! for an ATL03 granule.

/// A named storage location serving granules by resource name.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Asset name, for logging
    pub name: String,
    /// URL scheme understood by the provider, e.g. `file`
    pub format: String,
    /// Base URL (path or host prefix) under which resources live
    pub url: String,
}

impl Asset {
    /// Create an asset.
    #[must_use]
    pub fn new(name: &str, format: &str, url: &str) -> Self {
        Asset { name: name.to_string(), format: format.to_string(), url: url.to_string() }
    }

    /// Full URL of a resource within this asset.
    #[must_use]
    pub fn resource_url(&self, resource: &str) -> String {
        format!("{}://{}/{}", self.format, self.url, resource)
    }

    /// Full URL of the ATL08 companion of an ATL03 resource.
    #[must_use]
    pub fn classification_url(&self, resource: &str) -> String {
        self.resource_url(&classification_resource(resource))
    }
}

/// Name of the ATL08 companion file paired with an ATL03 resource.
///
/// The pairing is by filename convention: the product tag flips from ATL03
/// to ATL08, everything else is unchanged. Names without the tag map to
/// themselves, which test fixtures rely on.
#[must_use]
pub fn classification_resource(resource: &str) -> String {
    resource.replacen("ATL03", "ATL08", 1)
}
