//! Pipeline stages for medical report and scan analysis.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own and the backend can be swapped without touching
//! the decoders or the renderer.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ prompts ──▶ llm ──▶ postprocess ──▶ render
//! (bytes)   (text/px)   (template)  (API)   (tidy-up)       (PDF, on demand)
//! ```
//!
//! 1. [`input`]: resolve a path, URL or upload into an in-memory artifact
//!    and check its size and file signature
//! 2. [`extract`]: PDF text layer or decoded pixels; runs in
//!    `spawn_blocking` because both decoders are CPU-bound
//! 3. [`crate::prompts`]: fill the fixed template for the report kind
//! 4. [`llm`]: the single backend round-trip; the only stage with
//!    network I/O. Scans go through [`encode`] first.
//! 5. [`postprocess`]: deterministic clean-up of the reply
//! 6. [`render`]: lay the analysis out as a PDF in a transient file

pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
