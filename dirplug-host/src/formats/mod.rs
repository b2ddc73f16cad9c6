//! Bundled artifact formats
//!
//! - [`ManifestFormat`]: `*.plugin.json` manifests declaring script providers
//! - [`NameSegmentFormat`]: identities encoded in the file name, handy for tests
//!   and for directories of marker files

mod manifest;
mod name_segment;

pub use manifest::{ManifestFormat, ManifestLoader, ScriptProvider, MANIFEST_SUFFIX};
pub use name_segment::{NameSegmentFormat, NameSegmentLoader};
