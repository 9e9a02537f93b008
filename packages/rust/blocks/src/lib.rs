//! Block assembly for Plone/Volto documents.
//!
//! Turns caller-supplied block specs into stored block records and keeps a
//! document's `{blocks, blocks_layout}` pair consistent:
//! - [`SchemaRegistry`]: the closed set of block types, loaded once
//! - [`Normalizer`]: per-type normalization (rich text, images, references)
//! - [`AssemblyEngine`]: staging, write resolution and in-place block edits
//! - [`enforce_title`]: exactly one title block, canonical, always first

pub mod collaborators;
pub mod engine;
pub mod image;
pub mod normalize;
pub mod registry;
pub mod staging;
pub mod title;

pub use collaborators::{Clock, IdGenerator, SystemClock, UuidGenerator};
pub use engine::{AssemblyEngine, StageReceipt};
pub use image::{HttpImageChecker, ImageChecker, LenientImageChecker, is_image_data_url};
pub use normalize::{Normalizer, title_block};
pub use registry::{BlockKind, BlockSchema, BlockType, SchemaRegistry};
pub use staging::{STAGING_TTL_SECS, StagedLayout, StagingSlot};
pub use title::{enforce_title, reconcile_layout};
