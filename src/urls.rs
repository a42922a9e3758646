//! Access URLs printed at startup.

use std::fmt::Write as _;
use std::fs;

use reqwest::Url;
use tracing::warn;

use crate::archive::ArchiveFormat;
use crate::catalog::ServingCatalog;
use crate::error::{Error, Result};

/// Path of the route that archives every entry together.
pub const DOWNLOAD_ALL: &str = "DownThemAll";

/// Every URL under which one entry (or the combined archive) is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessResource {
    pub name: String,
    pub urls: Vec<String>,
}

/// `http://{host}:{port}/{path}`, bracketing IPv6 hosts.
///
/// Returns `None` when the pieces do not form a valid URL.
pub fn base_url(host: &str, port: u16, path: &str) -> Option<Url> {
    let host = if host.matches(':').count() >= 2 {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let mut url = Url::parse(&format!("http://{host}:{port}/")).ok()?;
    url.set_path(path);
    Some(url)
}

/// The `archive=` variants of `url`, zip first.
fn archive_urls(url: &Url) -> impl Iterator<Item = String> + '_ {
    ArchiveFormat::ALL.into_iter().map(move |format| {
        let mut url = url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("archive", format.extension());
        url.to_string()
    })
}

/// Combine addresses, catalog entries and port into access URLs.
///
/// Files get their original URL followed by both archive URLs; directories
/// only get archive URLs. With more than one entry, a [`DOWNLOAD_ALL`]
/// resource is appended. Within a resource URLs are grouped by address.
///
/// # Arguments
///
/// * `catalog` - Entries to advertise
/// * `port` - Port the server listens on
/// * `addresses` - Host names or address literals; unusable ones are skipped
///
/// # Errors
///
/// [`Error::Io`] when an entry's path can no longer be inspected.
pub fn compose_resources(
    catalog: &ServingCatalog,
    port: u16,
    addresses: &[String],
) -> Result<Vec<AccessResource>> {
    let mut resources = Vec::with_capacity(catalog.len() + 1);

    for entry in catalog.entries() {
        let metadata = fs::metadata(&entry.path).map_err(|e| Error::io(&entry.path, e))?;
        let mut urls = Vec::new();
        for url in addresses
            .iter()
            .filter_map(|address| usable_url(address, port, &entry.name))
        {
            if !metadata.is_dir() {
                urls.push(url.to_string());
            }
            urls.extend(archive_urls(&url));
        }
        resources.push(AccessResource {
            name: entry.name,
            urls,
        });
    }

    if catalog.len() > 1 {
        let urls = addresses
            .iter()
            .filter_map(|address| usable_url(address, port, DOWNLOAD_ALL))
            .flat_map(|url| archive_urls(&url).collect::<Vec<_>>())
            .collect();
        resources.push(AccessResource {
            name: DOWNLOAD_ALL.to_string(),
            urls,
        });
    }

    Ok(resources)
}

fn usable_url(address: &str, port: u16, path: &str) -> Option<Url> {
    let url = base_url(address, port, path);
    if url.is_none() {
        warn!("skipping address {:?}: not usable in a URL", address);
    }
    url
}

/// One block per resource: its name, then one tab-indented URL per line.
pub fn render(resources: &[AccessResource]) -> String {
    let mut out = String::new();
    for resource in resources {
        let _ = writeln!(out, "{}", resource.name);
        for url in &resource.urls {
            let _ = writeln!(out, "\t{url}");
        }
        out.push('\n');
    }
    out
}

pub fn print_access_urls(resources: &[AccessResource]) {
    print!("{}", render(resources));
}
