/*!
 * DNS Configuration
 * Renders the sandbox resolver file
 */

use super::request::DnsConfig;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Upper bound on search domains a resolver file may list
pub const MAX_DNS_SEARCHES: usize = 6;

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("DNSOption.Searches has more than {MAX_DNS_SEARCHES} domains ({0})")]
    TooManySearches(usize),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The write failed and the partial file could not be removed either
    #[error("{cause}; failed to remove {path:?}: {source}")]
    Cleanup {
        cause: Box<DnsError>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DnsError {
    pub fn is_validation(&self) -> bool {
        match self {
            DnsError::TooManySearches(_) => true,
            DnsError::Cleanup { cause, .. } => cause.is_validation(),
            DnsError::Write { .. } => false,
        }
    }
}

/// Render resolver file contents; `None` means "use the host's file"
pub fn render(dns: &DnsConfig) -> Result<Option<String>, DnsError> {
    if dns.is_empty() {
        return Ok(None);
    }
    if dns.searches.len() > MAX_DNS_SEARCHES {
        return Err(DnsError::TooManySearches(dns.searches.len()));
    }

    let mut out = String::new();
    if !dns.searches.is_empty() {
        let _ = writeln!(out, "search {}", dns.searches.join(" "));
    }
    for server in &dns.servers {
        let _ = writeln!(out, "nameserver {}", server);
    }
    if !dns.options.is_empty() {
        let _ = writeln!(out, "options {}", dns.options.join(" "));
    }
    Ok(Some(out))
}

/// Write the resolver file for `dns` to `target`
///
/// An empty configuration copies `host_resolv`. On failure the partially
/// written file is removed; if that also fails both errors are reported.
pub fn write_resolv_conf(dns: &DnsConfig, host_resolv: &Path, target: &Path) -> Result<(), DnsError> {
    let result = render(dns).and_then(|contents| {
        let written = match contents {
            Some(contents) => fs::write(target, contents),
            None => fs::copy(host_resolv, target).map(|_| ()),
        };
        written.map_err(|source| DnsError::Write {
            path: target.to_path_buf(),
            source,
        })
    });

    let Err(err) = result else {
        debug!(path = %target.display(), "resolver file written");
        return Ok(());
    };

    match fs::remove_file(target) {
        Ok(()) => Err(err),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(err),
        Err(source) => Err(DnsError::Cleanup {
            cause: Box::new(err),
            path: target.to_path_buf(),
            source,
        }),
    }
}
