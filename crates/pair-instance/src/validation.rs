//! Input validation, naming and normalization for instance specs
//!
//! Everything here runs before a single resource is written: a spec that
//! fails validation never reaches the store.

use pair_common::kube_utils::deterministic_hash;
use pair_common::{Error, Result};
use url::Url;

use crate::spec::{InstanceSpec, InstanceType};

/// Longest instance name that still leaves room for `-control-plane`
/// inside a 63-character label value.
pub const MAX_INSTANCE_NAME_LEN: usize = 50;

/// Number of hash characters appended to a derived name
const DERIVED_NAME_HASH_LEN: usize = 8;

/// GitHub's login length limit; keeps `<login>-<hash>` within
/// [`MAX_INSTANCE_NAME_LEN`]
pub const MAX_LOGIN_LEN: usize = 39;

/// Host bare `owner/repo` references are resolved against
const GITHUB_URL_PREFIX: &str = "https://github.com/";

/// Validate a caller-supplied spec
///
/// Checks, in order: name (when given), type, user, guests (Plain only),
/// repos, email and full name. The first failure is returned.
pub fn validate_spec(spec: &InstanceSpec) -> Result<()> {
    let who = if spec.name.is_empty() {
        spec.setup.user.as_str()
    } else {
        spec.name.as_str()
    };

    if !spec.name.is_empty() {
        validate_instance_name(&spec.name)?;
    }

    if spec.instance_type.is_none() {
        return Err(Error::validation_for_field(
            who,
            "type",
            "type must be one of Kubernetes, Plain",
        ));
    }

    if spec.setup.user.is_empty() {
        return Err(Error::validation_for_field(who, "setup.user", "no user declared"));
    }
    validate_login(&spec.setup.user)
        .map_err(|msg| Error::validation_for_field(who, "setup.user", msg))?;

    if spec.instance_type == Some(InstanceType::Plain) {
        if spec.setup.guests.is_empty() {
            return Err(Error::validation_for_field(
                who,
                "setup.guests",
                "Plain instances need at least one guest",
            ));
        }
        if spec.setup.guests.iter().any(String::is_empty) {
            return Err(Error::validation_for_field(
                who,
                "setup.guests",
                "guest names cannot be empty",
            ));
        }
    }

    let invalid: Vec<&str> = spec
        .setup
        .repos
        .iter()
        .filter(|r| !is_valid_repo(r))
        .map(String::as_str)
        .collect();
    if !invalid.is_empty() {
        return Err(Error::validation_for_field(
            who,
            "setup.repos",
            format!("invalid repos: {:?}", invalid),
        ));
    }

    if !is_valid_email(&spec.setup.email) {
        return Err(Error::validation_for_field(
            who,
            "setup.email",
            format!("invalid email '{}'", spec.setup.email),
        ));
    }

    if spec.setup.fullname.trim().is_empty() {
        return Err(Error::validation_for_field(
            who,
            "setup.fullname",
            "full name cannot be empty",
        ));
    }

    Ok(())
}

/// Validate an instance name as a DNS-1123 label short enough for every suffix
pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.len() > MAX_INSTANCE_NAME_LEN {
        return Err(Error::validation_for_field(
            name,
            "name",
            format!("name must be at most {} characters", MAX_INSTANCE_NAME_LEN),
        ));
    }
    validate_dns_label(name).map_err(|msg| Error::validation_for_field(name, "name", msg))
}

fn validate_dns_label(s: &str) -> std::result::Result<(), String> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => {
            return Err(format!(
                "name must start with a lowercase letter or digit: {}",
                s
            ))
        }
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(format!(
            "name must be lowercase alphanumeric with hyphens: {}",
            s
        ));
    }
    if s.ends_with('-') {
        return Err(format!("name cannot end with hyphen: {}", s));
    }
    Ok(())
}

/// GitHub-style login: alphanumeric and single hyphens, no leading hyphen
fn validate_login(login: &str) -> std::result::Result<(), String> {
    if login.len() > MAX_LOGIN_LEN {
        return Err(format!(
            "'{}' is longer than {} characters",
            login, MAX_LOGIN_LEN
        ));
    }
    if login.starts_with('-') || login.ends_with('-') || login.contains("--") {
        return Err(format!("'{}' is not a valid login", login));
    }
    if !login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("'{}' is not a valid login", login));
    }
    Ok(())
}

fn is_url(s: &str) -> bool {
    Url::parse(s).map(|u| u.has_host()).unwrap_or(false)
}

fn is_file_path(s: &str) -> bool {
    !s.is_empty() && !s.contains("://") && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn is_valid_repo(repo: &str) -> bool {
    is_url(repo) || is_file_path(repo)
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.contains('@') {
        return false;
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty()
                && !l.starts_with('-')
                && !l.ends_with('-')
                && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Turn a bare `owner/repo` into a GitHub URL; URLs and paths pass through
pub fn normalize_repo(repo: &str) -> String {
    let bare = !is_url(repo)
        && !repo.starts_with(['/', '.', '~'])
        && repo.matches('/').count() == 1
        && repo.split('/').all(|part| !part.is_empty());
    if bare {
        format!("{}{}", GITHUB_URL_PREFIX, repo)
    } else {
        repo.to_string()
    }
}

/// Normalize every repo reference in place
pub fn normalize_repos(repos: &mut [String]) {
    for repo in repos.iter_mut() {
        *repo = normalize_repo(repo);
    }
}

/// Derive a stable instance name from the setup
///
/// `<user lowercased>-<hash>` where the hash covers user, guests and repos,
/// so re-running a create for the same request lands on the same resources.
pub fn derive_instance_name(spec: &InstanceSpec) -> String {
    let user = spec.setup.user.to_lowercase();
    let mut material = vec![user.clone()];
    material.extend(spec.setup.guests.iter().map(|g| g.to_lowercase()));
    material.extend(spec.setup.repos.iter().cloned());
    let hash = deterministic_hash(&material.join("\n"));
    format!("{}-{}", user, &hash[..DERIVED_NAME_HASH_LEN])
}
