//! Opaque 128-bit identifiers for repositories and jobs.

use uuid::Uuid;

/// A fresh, content-independent identifier — every `repo_id`/`job_id` is
/// opaque per the data model, not derived from the thing it names.
pub fn new_opaque_id() -> Uuid {
    Uuid::new_v4()
}
