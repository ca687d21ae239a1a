//! Profile documents on disk.
//!
//! Profiles are JSON files in a platform-appropriate config directory, cached
//! in memory and reloaded when a backing file's modification time advances.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use anyhow::{Context, Result};
use vocab::Vocabulary;

use crate::filter::{LoadError, Profile};

/// Cached profile set with change detection.
///
/// Reloading is single-flight: the evaluation that observes a stale cache
/// reloads under `reload`, while concurrent evaluations that lose the
/// `try_lock` race simply use the cached profiles for this cycle.
pub struct ProfileStore {
	dir: PathBuf,
	cached: RwLock<Arc<Vec<Profile>>>,
	/// Wall-clock time of the last load; `None` until the first one.
	reload: Mutex<Option<SystemTime>>,
}

impl ProfileStore {
	/// Default profile directory.
	pub fn default_dir() -> Result<PathBuf> {
		let base = dirs::config_dir().context("config_dir() unavailable")?;
		Ok(base.join("lootscout").join("profiles"))
	}

	pub fn new(dir: PathBuf) -> Self {
		Self {
			dir,
			cached: RwLock::new(Arc::new(Vec::new())),
			reload: Mutex::new(None),
		}
	}

	/// Current profiles, reloading first if a backing file changed.
	pub fn profiles(&self, vocab: &Vocabulary) -> Arc<Vec<Profile>> {
		if let Ok(mut last_loaded) = self.reload.try_lock()
			&& last_loaded.is_none_or(|at| self.changed_since(at))
		{
			let loaded = Arc::new(load_dir(&self.dir, vocab));
			match self.cached.write() {
				Ok(mut cached) => *cached = loaded,
				Err(poisoned) => *poisoned.into_inner() = loaded,
			}
			*last_loaded = Some(SystemTime::now());
		}

		// A poisoned lock still holds the last good profile set.
		match self.cached.read() {
			Ok(cached) => cached.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	fn changed_since(&self, at: SystemTime) -> bool {
		let Ok(entries) = fs::read_dir(&self.dir) else {
			return false;
		};
		entries.flatten().any(|entry| {
			entry.path().extension().is_some_and(|ext| ext == "json")
				&& entry.metadata().and_then(|m| m.modified()).is_ok_and(|modified| modified > at)
		})
	}
}

/// Load and validate every profile document in `dir`, in path order.
///
/// Unreadable or unparsable documents are skipped with a warning; rules that
/// fail vocabulary validation are dropped inside [`Profile::validate`].
pub fn load_dir(dir: &Path, vocab: &Vocabulary) -> Vec<Profile> {
	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(err) => {
			tracing::warn!(dir = %dir.display(), error = %err, "no profile directory");
			return Vec::new();
		}
	};

	let mut paths: Vec<PathBuf> = entries
		.flatten()
		.map(|entry| entry.path())
		.filter(|path| path.extension().is_some_and(|ext| ext == "json"))
		.collect();
	paths.sort();

	let mut profiles = Vec::new();
	for path in paths {
		match load_profile(&path, vocab) {
			Ok((profile, errors)) => {
				tracing::info!(profile = profile.name, dropped_rules = errors.len(), "loaded profile");
				profiles.push(profile);
			}
			Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to load profile"),
		}
	}
	profiles
}

/// Load a single profile document, defaulting its name to the file stem.
pub fn load_profile(path: &Path, vocab: &Vocabulary) -> Result<(Profile, Vec<LoadError>)> {
	let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
	let mut profile: Profile = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
	if profile.name.is_empty() {
		profile.name = path
			.file_stem()
			.and_then(|stem| stem.to_str())
			.unwrap_or("profile")
			.to_string();
	}
	let errors = profile.validate(vocab);
	Ok((profile, errors))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;
	use std::time::Duration;

	fn test_vocab() -> Vocabulary {
		let mut vocab = Vocabulary::default();
		vocab.affixes.insert("movement_speed".into(), "movement speed".into());
		vocab
	}

	fn write_profile(dir: &Path, file: &str, body: &str) {
		fs::write(dir.join(file), body).unwrap();
	}

	#[test]
	fn loads_profiles_in_path_order_and_names_from_stems() {
		let dir = tempfile::tempdir().unwrap();
		write_profile(dir.path(), "b_rogue.json", r#"{"Aspects": []}"#);
		write_profile(dir.path(), "a_sorc.json", r#"{"name": "sorc", "Aspects": []}"#);
		write_profile(dir.path(), "notes.txt", "not a profile");

		let profiles = load_dir(dir.path(), &test_vocab());
		assert_eq!(profiles.len(), 2);
		assert_eq!(profiles[0].name, "sorc");
		assert_eq!(profiles[1].name, "b_rogue");
	}

	#[test]
	fn broken_documents_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		write_profile(dir.path(), "broken.json", "{ not json");
		write_profile(dir.path(), "ok.json", r#"{"name": "ok"}"#);

		let profiles = load_dir(dir.path(), &test_vocab());
		assert_eq!(profiles.len(), 1);
		assert_eq!(profiles[0].name, "ok");
	}

	#[test]
	fn validation_errors_surface_per_rule() {
		let dir = tempfile::tempdir().unwrap();
		write_profile(
			dir.path(),
			"typo.json",
			r#"{"Affixes": [{"Boots": {"affixPool": [{"count": [{"name": "movment_speed"}]}]}}]}"#,
		);
		let (profile, errors) = load_profile(&dir.path().join("typo.json"), &test_vocab()).unwrap();
		assert_eq!(errors.len(), 1);
		assert!(profile.affixes[0].is_empty());
	}

	#[test]
	fn store_reloads_when_a_file_changes() {
		let dir = tempfile::tempdir().unwrap();
		write_profile(dir.path(), "one.json", r#"{"name": "one"}"#);

		let vocab = test_vocab();
		let store = ProfileStore::new(dir.path().to_path_buf());
		assert_eq!(store.profiles(&vocab).len(), 1);

		// Make sure the new file's mtime lands after the recorded load time.
		thread::sleep(Duration::from_millis(20));
		write_profile(dir.path(), "two.json", r#"{"name": "two"}"#);
		assert_eq!(store.profiles(&vocab).len(), 2);
	}

	#[test]
	fn losing_the_reload_race_serves_the_cache() {
		let dir = tempfile::tempdir().unwrap();
		write_profile(dir.path(), "one.json", r#"{"name": "one"}"#);

		let vocab = test_vocab();
		let store = ProfileStore::new(dir.path().to_path_buf());
		assert_eq!(store.profiles(&vocab).len(), 1);

		thread::sleep(Duration::from_millis(20));
		write_profile(dir.path(), "two.json", r#"{"name": "two"}"#);

		// Hold the reload guard as a stand-in for a reload in flight; a
		// concurrent evaluation must serve the cached set without blocking.
		let in_flight = store.reload.lock().unwrap();
		thread::scope(|s| {
			s.spawn(|| {
				let cached = store.profiles(&vocab);
				assert_eq!(cached.len(), 1);
				assert_eq!(cached[0].name, "one");
			});
		});
		drop(in_flight);

		assert_eq!(store.profiles(&vocab).len(), 2);
	}

	#[test]
	fn missing_directory_yields_no_profiles() {
		let store = ProfileStore::new(PathBuf::from("/nonexistent/lootscout/profiles"));
		assert!(store.profiles(&test_vocab()).is_empty());
	}
}
