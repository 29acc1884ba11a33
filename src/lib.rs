//! Local OAuth 2.0 redirect-interception proxy: command-line tools ask for a token, the proxy
//! opens one browser flow per authorization identity, catches the redirect, redeems the code,
//! and serves the cached token until it nears expiry.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod proxy;
#[cfg(feature = "server")] pub mod server;
pub mod store;
pub mod system;
pub mod token;
pub mod url_key;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(feature = "cli")] use {clap as _, color_eyre as _, tracing_subscriber as _};
#[cfg(test)] use {http_body_util as _, tower as _};
