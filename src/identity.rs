//! Developer identity resolution
//!
//! Raw git authors are noisy: the same person commits under several names
//! and e-mail addresses, and bots should not count at all. The alias table
//! and the ignore list collapse that noise into stable canonical slugs.
//!
//! Lookup is exact and case-sensitive. An author offers three raw forms,
//! tried in order: `Name <email>`, `email`, `name`. When none of them is
//! configured, the author falls back to the slug of the e-mail local part
//! (or of the name), which is itself looked up again so slug-shaped
//! configuration entries keep working.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use crate::config::ConfigError;
use crate::models::RawAuthor;

static NON_SLUG: OnceLock<Regex> = OnceLock::new();

fn non_slug() -> &'static Regex {
    NON_SLUG.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

/// Make a filesystem-safe, lowercase slug.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let slug = non_slug().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}

/// Slug used when no alias matches: e-mail local part, else the name.
pub fn fallback_slug(author: &RawAuthor) -> String {
    if !author.email.is_empty() {
        let local = author.email.split('@').next().unwrap_or_default();
        slugify(local)
    } else if !author.name.is_empty() {
        slugify(&author.name)
    } else {
        "unknown-author".to_string()
    }
}

/// Outcome of resolving one raw author.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Counted under this canonical slug.
    Developer(String),
    /// On the ignore list: contributes to nothing.
    Ignored,
}

impl Resolution {
    pub fn slug(&self) -> Option<&str> {
        match self {
            Resolution::Developer(slug) => Some(slug),
            Resolution::Ignored => None,
        }
    }
}

/// Maps raw commit authors to canonical developer slugs.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, author: &RawAuthor) -> Resolution;

    /// Configured display name for a canonical slug, if any.
    fn display_name(&self, _slug: &str) -> Option<String> {
        None
    }
}

/// A configured developer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeveloperIdentity {
    pub canonical_slug: String,
    pub display_name: String,
    pub aliases: BTreeSet<String>,
    pub ignored: bool,
}

/// Identifiers to exclude entirely, loaded from `ignore_user.txt`.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    entries: HashSet<String>,
}

impl IgnoreList {
    /// Parse a newline-delimited list. Blank lines and `#` comments are skipped.
    ///
    /// Each entry is kept verbatim and as a slug; an e-mail entry also
    /// ignores the slug of its local part.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashSet::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.insert(line.to_string());
            entries.insert(slugify(line));
            if let Some((local, _)) = line.split_once('@') {
                entries.insert(slugify(local));
            }
        }
        Self { entries }
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text: Vec<String> = entries.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse(&text.join("\n"))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Alias table plus ignore list: the default [`IdentityResolver`].
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// raw identifier (or slug) -> canonical slug
    canonical: HashMap<String, String>,
    ignored: IgnoreList,
    identities: BTreeMap<String, DeveloperIdentity>,
}

impl AliasTable {
    /// Build from `canonical -> [raw identifiers]` entries in declaration order.
    ///
    /// Canonical keys are slugified and always map to themselves. A raw
    /// identifier claimed by two different canonical slugs is reported, and
    /// every such conflict is collected before returning.
    pub fn build<'a, I>(aliases: I, ignored: IgnoreList) -> Result<Self, Vec<ConfigError>>
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        let mut table = AliasTable {
            ignored,
            ..Default::default()
        };
        let mut errors = Vec::new();

        for (key, raws) in aliases {
            let canonical = slugify(key);
            if let Err(e) = table.claim(&canonical, &canonical) {
                errors.push(e);
            }

            let identity = table
                .identities
                .entry(canonical.clone())
                .or_insert_with(|| DeveloperIdentity {
                    canonical_slug: canonical.clone(),
                    display_name: key.trim().to_string(),
                    aliases: BTreeSet::new(),
                    ignored: false,
                });
            identity.aliases.extend(raws.iter().cloned());

            for raw in raws {
                if let Err(e) = table.claim(raw, &canonical) {
                    errors.push(e);
                }
            }
        }

        for identity in table.identities.values_mut() {
            identity.ignored = table.ignored.contains(&identity.canonical_slug);
        }

        if errors.is_empty() {
            Ok(table)
        } else {
            Err(errors)
        }
    }

    fn claim(&mut self, raw: &str, canonical: &str) -> Result<(), ConfigError> {
        match self.canonical.get(raw) {
            Some(existing) if existing != canonical => Err(ConfigError::DuplicateAlias {
                raw: raw.to_string(),
                first: existing.clone(),
                second: canonical.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.canonical.insert(raw.to_string(), canonical.to_string());
                Ok(())
            }
        }
    }

    /// Canonical slug configured for an exact raw identifier.
    pub fn canonical_of(&self, raw: &str) -> Option<&str> {
        self.canonical.get(raw).map(String::as_str)
    }

    pub fn identities(&self) -> impl Iterator<Item = &DeveloperIdentity> {
        self.identities.values()
    }

    pub fn identity(&self, slug: &str) -> Option<&DeveloperIdentity> {
        self.identities.get(slug)
    }

    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignored
    }
}

impl IdentityResolver for AliasTable {
    fn resolve(&self, author: &RawAuthor) -> Resolution {
        let identifier = author.identifier();
        let forms = [identifier.as_str(), author.email.as_str(), author.name.as_str()];
        let forms = forms.iter().filter(|f| !f.is_empty());

        if forms.clone().any(|f| self.ignored.contains(f)) {
            return Resolution::Ignored;
        }

        let canonical = forms
            .clone()
            .find_map(|f| self.canonical_of(f))
            .map(str::to_string)
            .unwrap_or_else(|| {
                let slug = fallback_slug(author);
                self.canonical_of(&slug).map(str::to_string).unwrap_or(slug)
            });

        if self.ignored.contains(&canonical) {
            Resolution::Ignored
        } else {
            Resolution::Developer(canonical)
        }
    }

    fn display_name(&self, slug: &str) -> Option<String> {
        self.identities.get(slug).map(|i| i.display_name.clone())
    }
}
