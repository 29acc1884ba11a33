//! Per-platform TCP port forwarding.

// self
use crate::{
	_prelude::*,
	system::{LOOPBACK, Platform, SystemError, run_checked, run_probe},
};

const ANY_ADDRESS: &str = "0.0.0.0";

/// Routes traffic from one local port to another.
pub trait PortForwarder
where
	Self: Debug + Send + Sync,
{
	/// Installs the `src_port -> dst_port` rule when it is not already active.
	fn ensure(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError>;
}

/// `sysctl` + `iptables -t nat` REDIRECT rules on the `OUTPUT` chain, which carries the
/// browser's loopback traffic.
#[derive(Clone, Copy, Debug)]
pub struct LinuxPortForwarder;
impl PortForwarder for LinuxPortForwarder {
	fn ensure(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError> {
		let sysctl = run_checked("sysctl", &["net.ipv4.ip_forward".into()])?;

		if ip_forward_enabled(&sysctl) {
			tracing::debug!("IP forwarding already enabled.");
		} else {
			tracing::info!("Enabling IP forwarding.");

			run_checked("sysctl", &["-w".into(), "net.ipv4.ip_forward=1".into()])?;
		}

		if run_probe("iptables", &iptables_rule_args("-C", src_port, dst_port))? {
			tracing::debug!(src_port, dst_port, "Port forwarding rule already present.");

			return Ok(());
		}

		tracing::info!(src_port, dst_port, "Adding port forwarding rule.");

		run_checked("iptables", &iptables_rule_args("-A", src_port, dst_port)).map(drop)
	}
}

/// `netsh interface portproxy` v4-to-v4 rules.
#[derive(Clone, Copy, Debug)]
pub struct WindowsPortForwarder;
impl PortForwarder for WindowsPortForwarder {
	fn ensure(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError> {
		let listing = run_checked(
			"netsh",
			&["interface".into(), "portproxy".into(), "show".into(), "v4tov4".into()],
		)?;

		if portproxy_rule_exists(&listing, src_port, dst_port) {
			tracing::debug!(src_port, dst_port, "Port proxy rule already present.");

			return Ok(());
		}

		tracing::info!(src_port, dst_port, "Adding port proxy rule.");

		run_checked(
			"netsh",
			&[
				"interface".into(),
				"portproxy".into(),
				"add".into(),
				"v4tov4".into(),
				format!("listenaddress={ANY_ADDRESS}"),
				format!("listenport={src_port}"),
				format!("connectaddress={LOOPBACK}"),
				format!("connectport={dst_port}"),
			],
		)
		.map(drop)
	}
}

/// Forwarder for platforms without a strategy.
#[derive(Clone, Copy, Debug)]
pub struct UnsupportedPortForwarder(pub Platform);
impl PortForwarder for UnsupportedPortForwarder {
	fn ensure(&self, _: u16, _: u16) -> Result<(), SystemError> {
		Err(SystemError::Unsupported { capability: "port forwarding", platform: self.0.as_str() })
	}
}

fn ip_forward_enabled(sysctl_output: &str) -> bool {
	sysctl_output
		.trim()
		.split_once('=')
		.is_some_and(|(name, value)| name.trim() == "net.ipv4.ip_forward" && value.trim() == "1")
}

fn iptables_rule_args(action: &str, src_port: u16, dst_port: u16) -> Vec<String> {
	let (src_port, dst_port) = (src_port.to_string(), dst_port.to_string());

	[
		"-t",
		"nat",
		action,
		"OUTPUT",
		"-p",
		"tcp",
		"-d",
		LOOPBACK,
		"--dport",
		src_port.as_str(),
		"-j",
		"REDIRECT",
		"--to-ports",
		dst_port.as_str(),
	]
	.into_iter()
	.map(str::to_owned)
	.collect()
}

fn portproxy_rule_exists(listing: &str, src_port: u16, dst_port: u16) -> bool {
	let expected =
		[ANY_ADDRESS.to_owned(), src_port.to_string(), LOOPBACK.to_owned(), dst_port.to_string()];

	listing.lines().any(|line| line.split_whitespace().eq(expected.iter().map(String::as_str)))
}
