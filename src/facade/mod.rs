//! Facades: the policy and composition layer above the data/metadata/
//! bucket/multipart stores.
//!
//! Nothing below this layer knows about ETags-plus-ownership records,
//! forbidden-key policy, or bucket existence — those cross-cutting
//! rules live here, once, instead of being duplicated in every backend.

mod bucket;
mod multipart;
mod object;

pub use bucket::BucketFacade;
pub use multipart::MultipartFacade;
pub use object::{CopyDirective, DeleteManyOutcome, ObjectFacade};
