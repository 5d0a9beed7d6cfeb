//! A parallel gzip/zlib/zip compressor and decompressor over deflate.
//!
//! # Overview
//!
//! `pgzip` solves the problem of compressing data at multi-core speed
//! while still producing a single, byte-compatible gzip, zlib, or
//! single-entry PKWare zip stream -- the same format a single-threaded
//! `gzip`/`zlib`/`zip` would produce, just built faster. Parallelism comes
//! from splitting input into fixed-size blocks, deflating each block on its
//! own independent thread, and having a dedicated writer stitch the
//! compressed blocks back together in input order -- the block boundaries
//! are invisible at the container level, there is exactly one header and
//! one trailer per stream.
//!
//! Three stages cooperate, coordinated through a small ring of [`pool::Pool`]
//! slots rather than channels:
//!
//! - The **reader** ([`reader`]) runs on the calling thread. It reads one
//!   block at a time, waits until a slot is safe to reuse, and spawns a
//!   short-lived compressor thread per block.
//! - Each **compressor** thread deflates its block (optionally seeded with
//!   the previous block's trailing 32 KiB as a preset dictionary) and
//!   computes that block's own check value, then exits.
//! - The **writer** ([`writer`]) runs on its own thread, draining slots
//!   strictly in order: join the compressor, write its bytes, fold its
//!   check value into the running total, release the slot back to the
//!   reader.
//!
//! Each slot carries a [`flag::Flag`] -- `Idle` / `Comp` / `Write` --
//! forming the rendezvous protocol that keeps the reader from overwriting a
//! block the writer hasn't drained yet, and keeps a compressor from reading
//! a dictionary source block the reader is about to recycle.
//!
//! With [`config::Config::workers`] set to `1`, [`pipeline::compress`] skips
//! the ring entirely and runs a single-threaded fallback that reuses one
//! encoder across the whole stream.
//!
//! Decompression ([`decompress`]) is intentionally not parallelized: a
//! single deflate stream has no block boundaries to exploit, so the only
//! concurrency there is an optional worker thread that computes a chunk's
//! check value while the previous chunk is being written.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use pgzip::config::{Config, Format};
//! use pgzip::pipeline;
//!
//! # fn main() -> pgzip::error::Result<()> {
//! let cfg = Config { workers: 4, format: Format::Gzip, ..Config::default() };
//! let input = b"the quick brown fox jumps over the lazy dog".repeat(1000);
//! let mut compressed = Vec::new();
//! pipeline::compress(&cfg, Cursor::new(&input), &mut compressed)?;
//!
//! let mut decompressed = Vec::new();
//! pgzip::decompress::decompress(4, Cursor::new(&compressed), &mut decompressed)?;
//! assert_eq!(decompressed, input);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod decompress;
pub mod deflate;
pub mod error;
pub mod flag;
pub mod framing;
pub mod lzw;
pub mod pipeline;
pub mod pool;
pub mod reader;
pub mod writer;

pub use config::{Config, Format};
pub use error::{Error, Result};
