// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
// GPU / graphics allowances — casts are intentional and safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
// Float comparison: the background sentinel is compared bit-exactly
#![allow(clippy::float_cmp)]
// GPU plumbing signatures carry passes, targets, and uniforms together
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

//! GPU heightmap projection and compositing engine built on wgpu.
//!
//! Relief converts 3-D mesh geometry into single-channel float elevation
//! rasters ("heightmaps"), layers elevation states with GPU texture
//! arithmetic, and recovers lost simulation state from persisted
//! displacement artifacts. It is the substrate for terrain-erosion
//! simulation and displacement-based terrain editing: erosion solvers
//! consume a [`heightmap::HeightMap`] and hand back a modified one.
//!
//! # Key entry points
//!
//! - [`engine::HeightmapEngine`] - the main engine façade
//! - [`gpu::GpuContext`] - the explicitly constructed GPU device object
//! - [`registry::MapRegistry`] - owner of every cached heightmap
//! - [`scene::Scene`] - the scene-graph collaborator model (objects,
//!   images, modifiers, node groups)
//! - [`settings::TerrainSettings`] - per-target configuration
//!
//! # Architecture
//!
//! Every public operation is synchronous: it records one or more render
//! passes or compute dispatches, submits them, and blocks until device
//! completion before returning. Two projection modes are supported - flat
//! (top-down orthographic) and equirectangular ("planet"), the latter built
//! from two hemisphere passes plus two polar-cap passes remapped into the
//! polar bands by a compute kernel. Planet pipelines can run in logarithmic
//! height domain so vertical angle survives linear resampling.

pub mod compositing;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod heightmap;
pub mod messages;
pub mod projection;
pub mod recovery;
pub mod registry;
pub mod scene;
pub mod settings;
