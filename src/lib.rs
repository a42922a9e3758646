//! # quickshare
//!
//! Share local files and directories over HTTP, with on-demand archives.
//!
//! Every shared path becomes a catalog entry named after its base name. Each
//! entry is reachable as its original bytes (files only) and as a zip or
//! gzip-tar archive built when requested. With several entries, a combined
//! archive of all of them is offered too. At startup the access URLs for
//! every reachable address of the host are printed.
//!
//! ## Features
//!
//! - Range and conditional requests for original files
//! - Recursive directory archives with `/`-separated member paths
//! - Local interface enumeration or public address lookup
//! - Graceful shutdown with a bounded window
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quickshare::{ServingCatalog, compose_resources, list_addresses, print_access_urls, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = ServingCatalog::from_paths(&["notes.txt", "photos"])?;
//!     let addresses = list_addresses(false).await?;
//!     print_access_urls(&compose_resources(&catalog, 5731, &addresses)?);
//!
//!     let listener = server::bind(5731).await?;
//!     server::serve(listener, Arc::new(catalog), server::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod net;
pub mod server;
pub mod urls;

pub use archive::{ArchiveFormat, ArchiveRequest, build_archive};
pub use catalog::{ServingCatalog, ServingEntry};
pub use cli::{Cli, Config};
pub use error::{Error, Result};
pub use net::{AddressSource, list_addresses};
pub use urls::{AccessResource, DOWNLOAD_ALL, compose_resources, print_access_urls};
