//! Hosts-file mappings for callback hostnames.

// std
use std::{
	fs::{self, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, system::SystemError};

const MARKER: &str = "### oauth2-local-proxy ###";

/// Hosts file that mappings are appended to.
#[derive(Clone, Debug)]
pub struct HostsFile {
	path: PathBuf,
}
impl HostsFile {
	/// Targets the file at `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// File location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Parses `(address, hostname)` pairs, one per hostname alias, ignoring comments and non-IPv4
	/// lines.
	pub fn mappings(&self) -> Result<Vec<(String, String)>, SystemError> {
		let contents = fs::read_to_string(&self.path)
			.map_err(|e| SystemError::io(format!("failed to read {}", self.path.display()), e))?;

		Ok(contents.lines().flat_map(parse_mappings).collect())
	}

	/// Appends `address hostname` under a marker comment unless already present.
	///
	/// Returns `true` when the file was modified.
	pub fn ensure_mapping(&self, address: &str, hostname: &str) -> Result<bool, SystemError> {
		if self.mappings()?.iter().any(|(a, h)| a == address && h.eq_ignore_ascii_case(hostname)) {
			return Ok(false);
		}

		let needs_newline = fs::read(&self.path)
			.map(|bytes| bytes.last().is_some_and(|last| *last != b'\n'))
			.map_err(|e| SystemError::io(format!("failed to read {}", self.path.display()), e))?;
		let mut file = OpenOptions::new()
			.append(true)
			.open(&self.path)
			.map_err(|e| SystemError::io(format!("failed to open {}", self.path.display()), e))?;
		let mut entry = String::new();

		if needs_newline {
			entry.push('\n');
		}

		entry.push_str(&format!("{MARKER}\n{address} {hostname}\n"));

		file.write_all(entry.as_bytes())
			.map_err(|e| SystemError::io(format!("failed to write {}", self.path.display()), e))?;

		Ok(true)
	}
}

fn parse_mappings(line: &str) -> Vec<(String, String)> {
	let line = line.split_once('#').map_or(line, |(content, _)| content);
	let mut parts = line.split_whitespace();
	let Some(address) = parts.next() else {
		return Vec::new();
	};

	if address.parse::<std::net::Ipv4Addr>().is_err() {
		return Vec::new();
	}

	parts.map(|hostname| (address.to_owned(), hostname.to_owned())).collect()
}
