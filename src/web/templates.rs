use askama::Template;

use crate::browser::{BucketEntry, ObjectEntry};

/// Bucket selector and object listing
#[derive(Template)]
#[template(path = "listing.html")]
pub(crate) struct ListingTemplate {
    pub(crate) base_path: String,
    pub(crate) show_bucket_selector: bool,
    pub(crate) buckets: Vec<BucketEntry>,
    /// Set once the bucket is known to exist, enables the object listing.
    pub(crate) bucket: Option<String>,
    pub(crate) objects: Vec<ObjectEntry>,
    /// Failure to show in place of the object listing.
    pub(crate) error: Option<String>,
    pub(crate) edit_action: String,
    pub(crate) download_action: String,
}

/// Object content in an editable text area
#[derive(Template)]
#[template(path = "edit.html")]
pub(crate) struct EditTemplate {
    pub(crate) bucket: String,
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) save_action: String,
    pub(crate) cancel_action: String,
}
