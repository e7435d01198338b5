//! Pipeline building blocks used by the strategies.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own. The pdfium- and VLM-backed modules are the reference
//! collaborators; the rest is pure data shaping.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ [render ─▶ encode ─▶ llm ─▶ postprocess] ──▶ layout ──▶ format
//! (path)    (text layer)   in-process inference, only without model data   (blocks)   (views)
//! ```
//!
//! 1. [`input`]    — read and validate a PDF, resolve its output directories
//! 2. [`classify`] — text-layer density verdict for the `auto` method
//! 3. [`render`]   — pdfium access; runs in `spawn_blocking` because pdfium
//!    is not async-safe
//! 4. [`encode`]   — PNG/base64 for the VLM, JPEG crops for image assets
//! 5. [`llm`]      — VLM calls with retry/backoff; the only network I/O
//! 6. [`postprocess`] — clean transcriptions and split them into layout records
//! 7. [`layout`]   — model record + text source → intermediate record
//! 8. [`format`]   — intermediate record → content list and Markdown

pub mod classify;
pub mod encode;
pub mod format;
pub mod input;
pub mod layout;
pub mod llm;
pub mod postprocess;
pub mod render;
