//! Normalized, hashable URLs with configurable, parameter-selective equality.
//!
//! A [`UrlKey`] pairs a parsed [`Url`] with a [`UrlEqualityMode`]. The mode decides which
//! components (scheme, host + port, path, fragment) and which query parameters take part in
//! equality and hashing. Registries keyed by [`UrlKey`] therefore collapse URLs that only differ
//! in ignored parameters (a fresh `state` or `nonce`) into one entry.

// self
use crate::_prelude::*;

/// Query parameters that define authorize-URL identity.
pub const AUTHORIZE_IDENTITY_PARAMS: [&str; 4] =
	["client_id", "scope", "redirect_uri", "response_type"];

/// Selects which URL components participate in [`UrlKey`] equality and hashing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UrlEqualityMode {
	/// Compare the scheme.
	pub scheme: bool,
	/// Compare the host together with its effective port.
	pub host: bool,
	/// Compare the path.
	pub path: bool,
	/// Compare the fragment.
	pub fragment: bool,
	/// Query parameters that count toward equality; `None` ignores every parameter.
	pub query_params: Option<BTreeSet<String>>,
}
impl UrlEqualityMode {
	/// Scheme, host, and path significant; fragment and query ignored.
	pub fn new() -> Self {
		Self { scheme: true, host: true, path: true, fragment: false, query_params: None }
	}

	/// Canonical authorize-URL identity: only the client, scope, redirect, and response type
	/// parameters are significant.
	pub fn authorize() -> Self {
		Self::new().with_query_params(AUTHORIZE_IDENTITY_PARAMS)
	}

	/// Restricts equality to the provided query parameter names.
	pub fn with_query_params<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.query_params = Some(names.into_iter().map(Into::into).collect());

		self
	}

	/// Toggles fragment significance.
	pub fn with_fragment(mut self, fragment: bool) -> Self {
		self.fragment = fragment;

		self
	}

	fn selects(&self, name: &str) -> bool {
		self.query_params.as_ref().is_some_and(|names| names.contains(name))
	}
}
impl Default for UrlEqualityMode {
	fn default() -> Self {
		Self::new()
	}
}

/// Immutable URL value whose identity follows its [`UrlEqualityMode`].
#[derive(Clone)]
pub struct UrlKey {
	url: Url,
	mode: UrlEqualityMode,
}
impl UrlKey {
	/// Parses `raw` under the provided equality mode.
	pub fn parse(raw: &str, mode: UrlEqualityMode) -> Result<Self> {
		let url = Url::parse(raw.trim()).map_err(|e| Error::malformed(format!("`{raw}`: {e}")))?;

		Ok(Self { url, mode })
	}

	/// Wraps an already parsed URL.
	pub fn from_url(url: Url, mode: UrlEqualityMode) -> Self {
		Self { url, mode }
	}

	/// Underlying parsed URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Serialized URL.
	pub fn as_str(&self) -> &str {
		self.url.as_str()
	}

	/// Equality mode attached to this key.
	pub fn mode(&self) -> &UrlEqualityMode {
		&self.mode
	}

	/// Same URL re-keyed under another equality mode.
	pub fn with_mode(&self, mode: UrlEqualityMode) -> Self {
		Self { url: self.url.clone(), mode }
	}

	/// Host name without the port; empty when the URL has no host.
	pub fn hostname(&self) -> &str {
		self.url.host_str().unwrap_or_default()
	}

	/// Explicit port, else the scheme's default (80 for `http`, 443 for `https`); `None` when
	/// neither is known.
	pub fn port(&self) -> Option<u16> {
		self.url.port_or_known_default()
	}

	/// URL path.
	pub fn path(&self) -> &str {
		self.url.path()
	}

	/// First value of the named query parameter.
	pub fn param(&self, name: &str) -> Option<String> {
		self.url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
	}

	/// All query parameters, grouped by name in first-appearance order.
	pub fn params(&self) -> Vec<(String, Vec<String>)> {
		let mut grouped: Vec<(String, Vec<String>)> = Vec::new();

		for (key, value) in self.url.query_pairs() {
			match grouped.iter_mut().find(|(name, _)| *name == key) {
				Some((_, values)) => values.push(value.into_owned()),
				None => grouped.push((key.into_owned(), vec![value.into_owned()])),
			}
		}

		grouped
	}

	/// Copy of this key with the named query parameters removed.
	pub fn without_params(&self, names: &[&str]) -> Self {
		let remaining = self.params().into_iter().filter(|(name, _)| !names.contains(&name.as_str()));

		self.rebuild_query(remaining)
	}

	/// Copy of this key with the provided parameters merged in; provided names replace existing
	/// values.
	pub fn with_params<I, K>(&self, params: I) -> Self
	where
		I: IntoIterator<Item = (K, Vec<String>)>,
		K: Into<String>,
	{
		let mut merged = self.params();

		for (name, values) in params {
			let name = name.into();

			match merged.iter_mut().find(|(existing, _)| *existing == name) {
				Some((_, existing)) => *existing = values,
				None => merged.push((name, values)),
			}
		}

		self.rebuild_query(merged)
	}

	/// Copy stripped of query and fragment, and of the path unless `include_path` is set.
	pub fn base(&self, include_path: bool) -> Self {
		let mut url = self.url.clone();

		url.set_query(None);
		url.set_fragment(None);

		if !include_path {
			url.set_path("");
		}

		Self { url, mode: self.mode.clone() }
	}

	/// Resolves `relative` against this URL.
	pub fn join(&self, relative: &str) -> Result<Self> {
		let url = self.url.join(relative).map_err(|e| Error::malformed(format!("`{relative}`: {e}")))?;

		Ok(Self { url, mode: self.mode.clone() })
	}

	fn rebuild_query<I>(&self, params: I) -> Self
	where
		I: IntoIterator<Item = (String, Vec<String>)>,
	{
		let mut url = self.url.clone();
		let mut serializer = url::form_urlencoded::Serializer::new(String::new());
		let mut empty = true;

		for (name, values) in params {
			for value in values {
				serializer.append_pair(&name, &value);

				empty = false;
			}
		}

		if empty {
			url.set_query(None);
		} else {
			url.set_query(Some(&serializer.finish()));
		}

		Self { url, mode: self.mode.clone() }
	}

	fn authority(&self) -> (Option<&str>, Option<u16>) {
		(self.url.host_str(), self.url.port_or_known_default())
	}

	/// Selected parameters sorted by name with sorted values, so ordering never matters.
	fn selected_params(&self) -> Vec<(String, Vec<String>)> {
		let mut selected: Vec<_> =
			self.params().into_iter().filter(|(name, _)| self.mode.selects(name)).collect();

		for (_, values) in selected.iter_mut() {
			values.sort();
		}

		selected.sort_by(|a, b| a.0.cmp(&b.0));

		selected
	}
}
impl PartialEq for UrlKey {
	fn eq(&self, other: &Self) -> bool {
		if self.mode != other.mode {
			return false;
		}

		let mode = &self.mode;

		(!mode.scheme || self.url.scheme() == other.url.scheme())
			&& (!mode.host || self.authority() == other.authority())
			&& (!mode.path || self.url.path() == other.url.path())
			&& (!mode.fragment || self.url.fragment() == other.url.fragment())
			&& self.selected_params() == other.selected_params()
	}
}
impl Eq for UrlKey {}
impl Hash for UrlKey {
	fn hash<H>(&self, state: &mut H)
	where
		H: Hasher,
	{
		if self.mode.scheme {
			self.url.scheme().hash(state);
		}
		if self.mode.host {
			self.authority().hash(state);
		}
		if self.mode.path {
			self.url.path().hash(state);
		}
		if self.mode.fragment {
			self.url.fragment().hash(state);
		}
		if self.mode.query_params.is_some() {
			self.selected_params().hash(state);
		}
	}
}
impl Debug for UrlKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "UrlKey({})", self.url)
	}
}
impl Display for UrlKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.url.as_str())
	}
}
impl FromStr for UrlKey {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s, UrlEqualityMode::default())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	fn key(raw: &str, mode: UrlEqualityMode) -> UrlKey {
		UrlKey::parse(raw, mode).expect("URL fixture should parse.")
	}

	fn client_mode() -> UrlEqualityMode {
		UrlEqualityMode::new().with_query_params(["client_id", "scope"])
	}

	#[test]
	fn ignored_params_do_not_affect_identity() {
		let a = key("https://idp.example/authorize?client_id=abc&scope=openid&state=1", client_mode());
		let b = key("https://idp.example/authorize?scope=openid&state=2&client_id=abc", client_mode());
		let c = key("https://idp.example/authorize?client_id=xyz&scope=openid&state=1", client_mode());

		assert_eq!(a, b);
		assert_ne!(a, c);

		let set: HashSet<_> = [a, b, c].into_iter().collect();

		assert_eq!(set.len(), 2);
	}

	#[test]
	fn multi_valued_params_compare_order_independently() {
		let a = key("https://idp.example/a?scope=x&scope=y", client_mode());
		let b = key("https://idp.example/a?scope=y&scope=x", client_mode());
		let c = key("https://idp.example/a?scope=y", client_mode());

		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn differing_modes_are_never_equal() {
		let raw = "https://idp.example/authorize?client_id=abc";

		assert_ne!(key(raw, UrlEqualityMode::new()), key(raw, client_mode()));
	}

	#[test]
	fn absent_param_list_ignores_every_param() {
		let a = key("https://idp.example/cb?code=1", UrlEqualityMode::new());
		let b = key("https://idp.example/cb?code=2#frag", UrlEqualityMode::new());

		assert_eq!(a, b);
		assert_ne!(
			key("https://idp.example/cb#one", UrlEqualityMode::new().with_fragment(true)),
			key("https://idp.example/cb#two", UrlEqualityMode::new().with_fragment(true)),
		);
	}

	#[test]
	fn explicit_default_port_matches_implicit_one() {
		assert_eq!(
			key("https://idp.example:443/authorize", UrlEqualityMode::new()),
			key("https://idp.example/authorize", UrlEqualityMode::new()),
		);
		assert_ne!(
			key("https://idp.example:8443/authorize", UrlEqualityMode::new()),
			key("https://idp.example/authorize", UrlEqualityMode::new()),
		);
	}

	#[test]
	fn derived_views_return_new_values() {
		let original =
			key("https://idp.example/authorize?client_id=abc&state=s1#x", UrlEqualityMode::new());
		let stripped = original.without_params(&["state"]);
		let merged = stripped.with_params([("client_id", vec!["def".to_owned()])]);

		assert_eq!(original.param("state").as_deref(), Some("s1"));
		assert_eq!(stripped.param("state"), None);
		assert_eq!(stripped.param("client_id").as_deref(), Some("abc"));
		assert_eq!(merged.param("client_id").as_deref(), Some("def"));
		assert_eq!(original.base(false).as_str(), "https://idp.example/");
		assert_eq!(original.base(true).as_str(), "https://idp.example/authorize");
	}

	#[test]
	fn removing_every_param_drops_the_query() {
		let url = key("https://localhost:8443/cb?state=abc", UrlEqualityMode::new());

		assert_eq!(url.without_params(&["state"]).as_str(), "https://localhost:8443/cb");
	}

	#[test]
	fn accessors_follow_scheme_defaults() {
		let https = key("https://localhost/cb", UrlEqualityMode::new());
		let http = key("http://Localhost:8080/cb", UrlEqualityMode::new());
		let custom = key("myapp://callback", UrlEqualityMode::new());

		assert_eq!(https.port(), Some(443));
		assert_eq!(http.port(), Some(8080));
		assert_eq!(http.hostname(), "localhost");
		assert_eq!(http.path(), "/cb");
		assert_eq!(custom.port(), None);
	}

	#[test]
	fn unparsable_input_is_malformed() {
		let err = UrlKey::parse("not a url", UrlEqualityMode::new())
			.expect_err("Relative garbage must not parse.");

		assert!(matches!(err, Error::MalformedInput { .. }));
	}
}
