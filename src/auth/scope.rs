//! Registry authorization scope modeling (resource type, resource name, actions).

// std
use std::collections::{BTreeMap, BTreeSet};
// self
use crate::_prelude::*;

/// Normalized set of registry authorization scopes.
///
/// Entries are keyed by `"type:name"` and carry the union of every action requested for that
/// resource, so `repository:library/alpine:pull` and `repository:library/alpine:push` collapse
/// into one entry with both actions. Keys and actions are kept sorted, which makes
/// [`normalize`](Self::normalize) stable and idempotent and lets the canonical string double as a
/// cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeMap<String, BTreeSet<String>>);
impl ScopeSet {
	/// Parses scope strings into a normalized set.
	///
	/// Each input string may itself contain multiple space-separated scopes. A scope splits on
	/// `:` into at most three parts (resource type, resource name, comma-separated actions). An
	/// empty string element anywhere cancels the whole set, mirroring the registry convention
	/// that a blank scope revokes the request.
	pub fn parse<I, S>(scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut set = Self::default();

		for raw in scopes {
			let raw = raw.as_ref();

			if raw.is_empty() {
				return Self::default();
			}

			for scope in raw.split(' ') {
				set.insert(scope);
			}
		}

		set
	}

	fn insert(&mut self, scope: &str) {
		let mut parts = scope.splitn(3, ':');
		let resource = parts.next().unwrap_or_default();
		let key = match parts.next() {
			Some(name) => format!("{resource}:{name}"),
			None => resource.to_owned(),
		};
		let actions = self.0.entry(key).or_default();

		if let Some(raw_actions) = parts.next() {
			actions.extend(raw_actions.split(',').map(str::to_owned));
		}
	}

	/// Merges every scope of `other` into `self`, unioning actions per resource.
	pub fn merge(&mut self, other: ScopeSet) {
		for (key, actions) in other.0 {
			self.0.entry(key).or_default().extend(actions);
		}
	}

	/// Returns the canonical per-scope serialization, sorted by `"type:name"`.
	pub fn normalize(&self) -> Vec<String> {
		self.0
			.iter()
			.map(|(name, actions)| {
				let actions = actions.iter().cloned().collect::<Vec<_>>().join(",");

				format!("{name}:{actions}")
			})
			.collect()
	}

	/// Returns the canonical space-joined form used as the token cache key.
	pub fn canonical(&self) -> String {
		self.normalize().join(" ")
	}

	/// Returns true when every scope of `other` is covered by `self`.
	pub fn contains(&self, other: &ScopeSet) -> bool {
		other
			.0
			.iter()
			.all(|(name, actions)| self.0.get(name).is_some_and(|own| actions.is_subset(own)))
	}

	/// Number of distinct resources in the set.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no scopes are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parse_accepts_single_and_multi_action_scopes() {
		let single = ScopeSet::parse(["repository:library/alpine:pull"]);
		let multi = ScopeSet::parse(["repository:library/alpine:pull,push"]);

		assert_eq!(single.normalize(), vec!["repository:library/alpine:pull"]);
		assert_eq!(multi.normalize(), vec!["repository:library/alpine:pull,push"]);
	}

	#[test]
	fn parse_splits_space_separated_scopes_in_one_string() {
		let set = ScopeSet::parse(["repository:foo:pull repository:bar:push"]);

		assert_eq!(set.normalize(), vec!["repository:bar:push", "repository:foo:pull"]);
	}

	#[test]
	fn empty_element_cancels_the_set() {
		let set = ScopeSet::parse(["repository:foo:pull", ""]);

		assert!(set.is_empty());
		assert!(ScopeSet::parse(Vec::<&str>::new()).is_empty());
	}

	#[test]
	fn duplicate_resources_union_their_actions() {
		let set = ScopeSet::parse(["repository:foo:pull", "repository:foo:push"]);

		assert_eq!(set.len(), 1);
		assert_eq!(set.normalize(), vec!["repository:foo:pull,push"]);
	}

	#[test]
	fn normalization_is_idempotent() {
		let set = ScopeSet::parse(["repository:b:push,pull repository:a:pull", "repository:b:pull"]);
		let normalized = set.normalize();
		let again = ScopeSet::parse(&normalized).normalize();

		assert_eq!(normalized, again);
		assert_eq!(normalized, vec!["repository:a:pull", "repository:b:pull,push"]);
	}

	#[test]
	fn containment_is_reflexive() {
		let set = ScopeSet::parse(["repository:foo:pull,push", "registry:catalog:*"]);

		assert!(set.contains(&set));
	}

	#[test]
	fn union_contains_both_operands() {
		let a = ScopeSet::parse(["repository:foo:pull"]);
		let b = ScopeSet::parse(["repository:foo:push", "repository:bar:pull"]);
		let mut union = a.clone();

		union.merge(b.clone());

		assert!(union.contains(&a));
		assert!(union.contains(&b));
	}

	#[test]
	fn containment_rejects_missing_actions_and_resources() {
		let held = ScopeSet::parse(["repository:foo:pull"]);

		assert!(!held.contains(&ScopeSet::parse(["repository:foo:pull,push"])));
		assert!(!held.contains(&ScopeSet::parse(["repository:bar:pull"])));
		assert!(held.contains(&ScopeSet::default()));
	}

	#[test]
	fn actionless_scopes_keep_a_trailing_separator() {
		let set = ScopeSet::parse(["repository:foo"]);

		assert_eq!(set.normalize(), vec!["repository:foo:"]);
		assert_eq!(set.canonical(), "repository:foo:");
	}
}
