//! `WWW-Authenticate` challenge parsing (the RFC 7235 subset registries emit).

// self
use crate::_prelude::*;

/// HTTP authentication schemes carried by registry challenges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthScheme {
	/// `user:secret` pair, base64-encoded into the header.
	Basic,
	/// Opaque token minted by the registry's authorization service.
	Bearer,
	/// Any scheme the authorizer does not negotiate; preserved for error reporting.
	Other(String),
}
impl AuthScheme {
	fn from_token(token: &str) -> Self {
		if token.eq_ignore_ascii_case("basic") {
			Self::Basic
		} else if token.eq_ignore_ascii_case("bearer") {
			Self::Bearer
		} else {
			Self::Other(token.to_owned())
		}
	}

	/// Returns the canonical scheme label.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Basic => "Basic",
			Self::Bearer => "Bearer",
			Self::Other(scheme) => scheme,
		}
	}
}
impl Display for AuthScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One parsed challenge: a scheme plus its auth parameters.
#[derive(Clone, Debug)]
pub struct Challenge {
	/// Scheme named by the challenge.
	pub scheme: AuthScheme,
	/// Auth parameters with lowercased names (`realm`, `service`, `scope`, `error`).
	pub parameters: HashMap<String, String>,
}
impl Challenge {
	fn new(scheme: AuthScheme) -> Self {
		Self { scheme, parameters: HashMap::new() }
	}

	/// Returns the named parameter, looked up case-insensitively.
	pub fn parameter(&self, name: &str) -> Option<&str> {
		self.parameters.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}

/// Parses every challenge found across the provided header values, preserving wire order.
///
/// One header value may carry several comma-separated challenges. Scheme and parameter names are
/// case-insensitive; parameter values may be quoted strings with backslash escapes. Malformed
/// fragments are skipped rather than failing the whole header.
pub fn parse_challenges<'a, I>(headers: I) -> Vec<Challenge>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut challenges = Vec::new();

	for value in headers {
		parse_header_value(value, &mut challenges);
	}

	challenges
}

fn parse_header_value(value: &str, challenges: &mut Vec<Challenge>) {
	let mut rest = value;

	loop {
		rest = rest.trim_start_matches([' ', '\t', ',']);

		if rest.is_empty() {
			return;
		}

		let (token, after_token) = read_token(rest);

		if token.is_empty() {
			// not a token character, nothing more to salvage from this header
			return;
		}

		rest = after_token.trim_start_matches([' ', '\t']);

		if let Some(after_eq) = rest.strip_prefix('=') {
			rest = after_eq.trim_start_matches([' ', '\t']);

			let (parameter, after_value) = read_value(rest);

			rest = after_value;

			if let Some(current) = challenges.last_mut() {
				current.parameters.insert(token.to_ascii_lowercase(), parameter);
			}
		} else {
			challenges.push(Challenge::new(AuthScheme::from_token(token)));
		}
	}
}

fn read_token(input: &str) -> (&str, &str) {
	let end = input.find(|c| !is_tchar(c)).unwrap_or(input.len());

	input.split_at(end)
}

fn read_value(input: &str) -> (String, &str) {
	match input.strip_prefix('"') {
		Some(quoted) => read_quoted(quoted),
		None => {
			let (token, rest) = read_token(input);

			(token.to_owned(), rest)
		},
	}
}

fn read_quoted(input: &str) -> (String, &str) {
	let mut value = String::new();
	let mut chars = input.char_indices();

	while let Some((idx, c)) = chars.next() {
		match c {
			'"' => return (value, &input[idx + 1..]),
			'\\' => {
				if let Some((_, escaped)) = chars.next() {
					value.push(escaped);
				}
			},
			_ => value.push(c),
		}
	}

	// unterminated quoted string, consume the remainder
	(value, "")
}

fn is_tchar(c: char) -> bool {
	c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_docker_hub_style_challenges() {
		let cases = [
			r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:samalba/my-app:pull,push""#,
			r#"Bearer realm="https://auth.example.com/token", service="registry.example.com",scope="repository:samalba/my-app:pull,push""#,
			r#"Bearer   service="registry.example.com", scope="repository:samalba/my-app:pull,push",realm="https://auth.example.com/token""#,
		];

		for case in cases {
			let challenges = parse_challenges([case]);

			assert_eq!(challenges.len(), 1, "one challenge expected for {case}");
			assert_eq!(challenges[0].scheme, AuthScheme::Bearer);
			assert_eq!(challenges[0].parameter("realm"), Some("https://auth.example.com/token"));
			assert_eq!(challenges[0].parameter("service"), Some("registry.example.com"));
			assert_eq!(
				challenges[0].parameter("scope"),
				Some("repository:samalba/my-app:pull,push"),
			);
		}
	}

	#[test]
	fn parses_multiple_challenges_in_one_header() {
		let challenges = parse_challenges([r#"Basic realm="host", Bearer realm="https://t",error="insufficient_scope""#]);

		assert_eq!(challenges.len(), 2);
		assert_eq!(challenges[0].scheme, AuthScheme::Basic);
		assert_eq!(challenges[0].parameter("realm"), Some("host"));
		assert_eq!(challenges[1].scheme, AuthScheme::Bearer);
		assert_eq!(challenges[1].parameter("error"), Some("insufficient_scope"));
	}

	#[test]
	fn parses_challenges_across_multiple_headers_in_order() {
		let challenges = parse_challenges([r#"Bearer realm="https://t""#, "Basic"]);

		assert_eq!(challenges.len(), 2);
		assert_eq!(challenges[0].scheme, AuthScheme::Bearer);
		assert_eq!(challenges[1].scheme, AuthScheme::Basic);
	}

	#[test]
	fn scheme_and_parameter_names_are_case_insensitive() {
		let challenges = parse_challenges([r#"BEARER Realm="https://t",SERVICE=reg"#]);

		assert_eq!(challenges[0].scheme, AuthScheme::Bearer);
		assert_eq!(challenges[0].parameter("realm"), Some("https://t"));
		assert_eq!(challenges[0].parameter("Service"), Some("reg"));
	}

	#[test]
	fn quoted_values_keep_commas_and_unescape_quotes() {
		let challenges = parse_challenges([r#"Bearer scope="repository:a:pull,push",note="say \"hi\"""#]);

		assert_eq!(challenges[0].parameter("scope"), Some("repository:a:pull,push"));
		assert_eq!(challenges[0].parameter("note"), Some(r#"say "hi""#));
	}

	#[test]
	fn unknown_schemes_are_preserved_for_reporting() {
		let challenges = parse_challenges(["Negotiate, Basic"]);

		assert_eq!(challenges[0].scheme, AuthScheme::Other("Negotiate".into()));
		assert_eq!(challenges[1].scheme, AuthScheme::Basic);
	}

	#[test]
	fn garbage_never_panics() {
		assert!(parse_challenges([""]).is_empty());
		assert!(parse_challenges([",,,  "]).is_empty());
		assert!(parse_challenges([r#"="orphan""#]).is_empty());

		let unterminated = parse_challenges([r#"Bearer realm="https://t"#]);

		assert_eq!(unterminated[0].parameter("realm"), Some("https://t"));
	}
}
