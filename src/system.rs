//! Host-side capabilities: launching the browser and routing the callback to the proxy.
//!
//! [`SystemCapabilities`] is the seam the orchestrator depends on. [`HostSystem`] is the
//! production bundle, selected once at startup by [`HostSystem::detect`].

pub mod browser;
pub mod forward;
pub mod hosts;

pub use browser::*;
pub use forward::*;
pub use hosts::*;

// std
use std::{fs, io, process::Command};
// self
use crate::_prelude::*;

/// Loopback address callback hostnames are mapped to.
pub const LOOPBACK: &str = "127.0.0.1";

/// Best-effort operating-system calls made on behalf of an authorization flow.
pub trait SystemCapabilities
where
	Self: Send + Sync,
{
	/// Opens `url` in the user's browser.
	fn open_browser(&self, url: &str) -> Result<(), SystemError>;

	/// Makes `hostname` resolve to [`LOOPBACK`].
	fn ensure_hostname_resolves_to_loopback(&self, hostname: &str) -> Result<(), SystemError>;

	/// Routes TCP traffic arriving on `src_port` to `dst_port`.
	fn ensure_port_forward(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError>;
}

/// Failures raised by [`SystemCapabilities`] implementations.
#[derive(Clone, Debug, ThisError)]
pub enum SystemError {
	/// File or process I/O failed.
	#[error("{context}: {source}")]
	Io {
		/// What was being attempted.
		context: String,
		/// Underlying I/O failure.
		#[source]
		source: Arc<io::Error>,
	},
	/// A helper program exited unsuccessfully.
	#[error("`{program}` exited with {status}")]
	CommandFailed {
		/// Command line that failed.
		program: String,
		/// Exit status description.
		status: String,
	},
	/// The platform offers no implementation of the requested capability.
	#[error("{capability} is not supported on {platform}")]
	Unsupported {
		/// Capability name.
		capability: &'static str,
		/// Platform label.
		platform: &'static str,
	},
}
impl SystemError {
	pub(crate) fn io(context: impl Display, source: io::Error) -> Self {
		Self::Io { context: context.to_string(), source: Arc::new(source) }
	}
}

/// Operating system flavor the proxy runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
	/// Native Linux.
	Linux,
	/// Linux under WSL 2, where the browser lives on the Windows side.
	Wsl,
	/// Windows.
	Windows,
	/// macOS.
	MacOs,
	/// Anything else.
	Other,
}
impl Platform {
	/// Detects the current platform.
	pub fn detect() -> Self {
		if cfg!(target_os = "windows") {
			Self::Windows
		} else if cfg!(target_os = "macos") {
			Self::MacOs
		} else if cfg!(target_os = "linux") {
			let release = fs::read_to_string("/proc/sys/kernel/osrelease").unwrap_or_default();

			if Self::is_wsl_release(&release) { Self::Wsl } else { Self::Linux }
		} else {
			Self::Other
		}
	}

	/// Returns `true` for WSL 2 kernel release strings.
	pub fn is_wsl_release(release: &str) -> bool {
		let release = release.to_ascii_lowercase();

		release.contains("microsoft") && release.contains("wsl2")
	}

	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Linux => "linux",
			Platform::Wsl => "wsl",
			Platform::Windows => "windows",
			Platform::MacOs => "macos",
			Platform::Other => "other",
		}
	}

	/// Default location of the hosts file.
	pub const fn hosts_path(self) -> &'static str {
		match self {
			Platform::Windows => r"C:\Windows\System32\drivers\etc\hosts",
			_ => "/etc/hosts",
		}
	}
}

/// Production capability bundle for the current host.
#[derive(Debug)]
pub struct HostSystem {
	platform: Platform,
	browser: Browser,
	hosts: HostsFile,
	forwarder: Box<dyn PortForwarder>,
}
impl HostSystem {
	/// Assembles the bundle matching [`Platform::detect`].
	pub fn detect() -> Self {
		Self::for_platform(Platform::detect())
	}

	/// Assembles the bundle for an explicit platform.
	pub fn for_platform(platform: Platform) -> Self {
		let forwarder: Box<dyn PortForwarder> = match platform {
			Platform::Linux | Platform::Wsl => Box::new(LinuxPortForwarder),
			Platform::Windows => Box::new(WindowsPortForwarder),
			Platform::MacOs | Platform::Other => Box::new(UnsupportedPortForwarder(platform)),
		};

		Self {
			platform,
			browser: Browser::new(platform),
			hosts: HostsFile::new(platform.hosts_path()),
			forwarder,
		}
	}

	/// Replaces the hosts file location.
	pub fn with_hosts_file(mut self, hosts: HostsFile) -> Self {
		self.hosts = hosts;

		self
	}

	/// Detected platform.
	pub fn platform(&self) -> Platform {
		self.platform
	}
}
impl SystemCapabilities for HostSystem {
	fn open_browser(&self, url: &str) -> Result<(), SystemError> {
		self.browser.open(url)
	}

	fn ensure_hostname_resolves_to_loopback(&self, hostname: &str) -> Result<(), SystemError> {
		if self.hosts.ensure_mapping(LOOPBACK, hostname)? {
			tracing::info!(hostname, path = %self.hosts.path().display(), "Mapped hostname to loopback.");
		}

		Ok(())
	}

	fn ensure_port_forward(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError> {
		self.forwarder.ensure(src_port, dst_port)
	}
}

/// Runs `program args..` and fails unless it exits successfully; returns captured stdout.
pub(crate) fn run_checked(program: &str, args: &[String]) -> Result<String, SystemError> {
	let command_line = format!("{program} {}", args.join(" "));
	let output = Command::new(program)
		.args(args)
		.output()
		.map_err(|e| SystemError::io(format!("failed to run `{command_line}`"), e))?;

	if !output.status.success() {
		return Err(SystemError::CommandFailed {
			program: command_line,
			status: output.status.to_string(),
		});
	}

	Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs `program args..` and reports whether it exited successfully.
pub(crate) fn run_probe(program: &str, args: &[String]) -> Result<bool, SystemError> {
	Command::new(program)
		.args(args)
		.output()
		.map(|output| output.status.success())
		.map_err(|e| SystemError::io(format!("failed to run `{program}`"), e))
}
