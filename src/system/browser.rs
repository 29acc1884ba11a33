//! Default-browser launcher.

// self
use crate::{
	_prelude::*,
	system::{Platform, SystemError, run_checked},
};

/// Opens URLs in the user's default browser.
#[derive(Clone, Copy, Debug)]
pub struct Browser {
	platform: Platform,
}
impl Browser {
	/// Creates a launcher for `platform`.
	pub fn new(platform: Platform) -> Self {
		Self { platform }
	}

	/// Opens `url`; under WSL the Windows shell is used so the host browser receives it.
	pub fn open(&self, url: &str) -> Result<(), SystemError> {
		if self.platform == Platform::Wsl {
			run_checked("cmd.exe", &wsl_start_args(url))?;

			return Ok(());
		}

		open::that(url).map_err(|e| SystemError::io("failed to open the browser", e))
	}
}

/// `cmd.exe` arguments for `start`, with `&` escaped for the Windows shell.
fn wsl_start_args(url: &str) -> Vec<String> {
	vec!["/c".into(), "start".into(), String::new(), url.replace('&', "^&")]
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn wsl_arguments_escape_ampersands() {
		let args = wsl_start_args("https://idp.example/a?x=1&y=2");

		assert_eq!(args, ["/c", "start", "", "https://idp.example/a?x=1^&y=2"]);
	}
}
