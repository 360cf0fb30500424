// src/packagedb.rs

//! Registry of installed modules
//!
//! Layout under `top_builddir`:
//!
//! ```text
//! info/<module>        <entry package=".." version=".." installed=".." configure-hash=".."/>
//! manifests/<module>   one absolute path per line, directories end in '/'
//! packagedb.xml        legacy single-file database, read-only
//! packagedb.xml.migrated  the legacy file once its entries were copied
//! ```
//!
//! Records are written to a temporary sibling and renamed into place. The
//! manifest is written before the info record, so an info record is never
//! visible without a manifest. The legacy file is consulted until the first
//! write migrates it; it is then renamed so it is never read again.

use crate::error::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, TimeZone, Utc};
use md5::{Digest, Md5};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const INFO_DIR: &str = "info";
const MANIFESTS_DIR: &str = "manifests";
const LEGACY_DB: &str = "packagedb.xml";
const MIGRATED_SUFFIX: &str = ".migrated";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Digest recorded for a configure command line
pub fn configure_hash(command: &str) -> String {
    hex::encode(Md5::digest(command.as_bytes()))
}

/// One installed module
#[derive(Debug)]
pub struct PackageEntry {
    pub package: String,
    pub version: String,
    pub installed_date: DateTime<Utc>,
    pub configure_hash: Option<String>,
    manifest_path: Option<PathBuf>,
    manifest: OnceCell<Option<Vec<String>>>,
}

impl PackageEntry {
    fn new(package: String, version: String, installed_date: DateTime<Utc>) -> Self {
        Self {
            package,
            version,
            installed_date,
            configure_hash: None,
            manifest_path: None,
            manifest: OnceCell::new(),
        }
    }

    /// Installed paths, read on first access; `None` when no manifest exists
    pub fn manifest(&self) -> Result<Option<&[String]>> {
        if self.manifest.get().is_none() {
            let loaded = match &self.manifest_path {
                Some(path) => read_manifest(path)?,
                None => None,
            };
            let _ = self.manifest.set(loaded);
        }
        Ok(self.manifest.get().and_then(|m| m.as_deref()))
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\"?>\n<entry package=\"{}\" version=\"{}\" installed=\"{}\"",
            escape(&self.package),
            escape(&self.version),
            self.installed_date.format(DATE_FORMAT)
        );
        if let Some(hash) = &self.configure_hash {
            xml.push_str(&format!(" configure-hash=\"{}\"", escape(hash)));
        }
        xml.push_str("/>\n");
        xml
    }
}

/// Directory-backed package database
#[derive(Debug)]
pub struct PackageDb {
    dir: PathBuf,
    prefix: PathBuf,
    legacy: OnceCell<HashMap<String, PackageEntry>>,
}

impl PackageDb {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            legacy: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn info_path(&self, name: &str) -> PathBuf {
        self.dir.join(INFO_DIR).join(name)
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.dir.join(MANIFESTS_DIR).join(name)
    }

    fn legacy_path(&self) -> PathBuf {
        self.dir.join(LEGACY_DB)
    }

    /// True while a legacy database exists that has not been migrated
    fn legacy_pending(&self) -> bool {
        self.legacy_path().is_file()
    }

    fn legacy_entries(&self) -> &HashMap<String, PackageEntry> {
        self.legacy.get_or_init(|| {
            let path = self.legacy_path();
            if !path.exists() {
                return HashMap::new();
            }
            match parse_legacy(&path) {
                Ok(entries) => {
                    debug!("Read {} entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", path.display(), e);
                    HashMap::new()
                }
            }
        })
    }

    /// Look up an installed module
    pub fn get(&self, name: &str) -> Result<Option<PackageEntry>> {
        let info = self.info_path(name);
        match fs::read_to_string(&info) {
            Ok(content) => {
                let mut entry = parse_info(&content)
                    .map_err(|e| Error::PackageDb(format!("{}: {}", info.display(), e)))?;
                entry.manifest_path = Some(self.manifest_path(name));
                Ok(Some(entry))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.legacy_pending() {
                    Ok(self.legacy_entries().get(name).map(clone_legacy))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the module is installed, at `version` when given
    pub fn check(&self, name: &str, version: Option<&str>) -> bool {
        match self.get(name) {
            Ok(Some(entry)) => version.is_none_or(|v| entry.version == v),
            Ok(None) => false,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    pub fn installdate(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).ok().flatten().map(|entry| entry.installed_date)
    }

    /// Names of all installed modules, sorted
    pub fn installed(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        if self.legacy_pending() {
            names.extend(self.legacy_entries().keys().cloned());
        }
        match fs::read_dir(self.dir.join(INFO_DIR)) {
            Ok(entries) => {
                for entry in entries {
                    let name = entry?.file_name().to_string_lossy().into_owned();
                    if !name.starts_with('.') {
                        names.insert(name);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(names.into_iter().collect())
    }

    /// Record an install, replacing any previous record of the module
    pub fn add(
        &self,
        name: &str,
        version: &str,
        manifest: &[String],
        configure_cmd: Option<&str>,
    ) -> Result<()> {
        self.migrate_legacy()?;

        let now = Utc::now().trunc_subsecs(0);
        let installed_date = match self.installdate(name) {
            Some(previous) if previous >= now => previous + chrono::Duration::seconds(1),
            _ => now,
        };

        let mut entry = PackageEntry::new(name.to_string(), version.to_string(), installed_date);
        entry.configure_hash = configure_cmd.map(configure_hash);
        self.write_entry(&entry, manifest)?;
        debug!("Recorded {} version {} in package database", name, version);
        Ok(())
    }

    fn write_entry(&self, entry: &PackageEntry, manifest: &[String]) -> Result<()> {
        let mut lines = String::new();
        for path in manifest {
            if path.contains('\n') {
                warn!("Dropping manifest entry of {} containing a newline: {:?}", entry.package, path);
                continue;
            }
            lines.push_str(path);
            lines.push('\n');
        }
        write_atomic(&self.manifest_path(&entry.package), lines.as_bytes())?;
        write_atomic(&self.info_path(&entry.package), entry.to_xml().as_bytes())
    }

    /// Copy legacy entries into the per-file layout before the first write,
    /// then retire the legacy file
    fn migrate_legacy(&self) -> Result<()> {
        if !self.legacy_pending() {
            return Ok(());
        }
        let legacy = self.legacy_entries();
        info!("Migrating {} entries from {}", legacy.len(), LEGACY_DB);
        for entry in legacy.values() {
            // A record written by an interrupted migration is newer
            if self.info_path(&entry.package).exists() {
                continue;
            }
            let manifest = entry.manifest()?.map(<[String]>::to_vec).unwrap_or_default();
            self.write_entry(entry, &manifest)?;
        }
        let retired = self.dir.join(format!("{LEGACY_DB}{MIGRATED_SUFFIX}"));
        fs::rename(self.legacy_path(), &retired)?;
        debug!("Moved {} to {}", LEGACY_DB, retired.display());
        Ok(())
    }

    /// Remove the module's files from the prefix and forget it
    pub fn uninstall(&self, name: &str) -> Result<()> {
        self.migrate_legacy()?;

        let entry = self
            .get(name)?
            .ok_or_else(|| Error::PackageDb(format!("{name} is not installed")))?;
        let Some(manifest) = entry.manifest()? else {
            return Err(Error::BuildState(format!(
                "{name} has no file manifest; it cannot be uninstalled"
            )));
        };

        let failed = remove_paths(manifest, &self.prefix);
        if failed > 0 {
            warn!("{} path(s) of {} could not be removed", failed, name);
        }

        remove_record(&self.info_path(name))?;
        remove_record(&self.manifest_path(name))?;
        info!("Uninstalled {}", name);
        Ok(())
    }
}

/// Delete manifest paths under `prefix`: files first, then directories that
/// ended up empty, deepest first. Returns the number of failed removals.
pub(crate) fn remove_paths(paths: &[String], prefix: &Path) -> usize {
    let mut failed = 0;
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for entry in paths {
        let path = Path::new(entry.trim_end_matches('/'));
        if !path.starts_with(prefix) || path == prefix {
            debug!("Not removing {}: outside {}", entry, prefix.display());
            continue;
        }
        if entry.ends_with('/') {
            dirs.insert(path.to_path_buf());
            continue;
        }
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {
                dirs.insert(path.to_path_buf());
                continue;
            }
            Ok(_) => {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    failed += 1;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                failed += 1;
            }
        }
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == prefix || !dir.starts_with(prefix) {
                break;
            }
            dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }

    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        // Shared directories are still populated; leave them.
        if let Err(e) = fs::remove_dir(&dir) {
            debug!("Keeping {}: {}", dir.display(), e);
        }
    }
    failed
}

fn remove_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::PackageDb(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Option<Vec<String>>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(
            content
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn clone_legacy(entry: &PackageEntry) -> PackageEntry {
    let manifest = OnceCell::new();
    if let Some(files) = entry.manifest.get() {
        let _ = manifest.set(files.clone());
    }
    PackageEntry {
        package: entry.package.clone(),
        version: entry.version.clone(),
        installed_date: entry.installed_date,
        configure_hash: entry.configure_hash.clone(),
        manifest_path: None,
        manifest,
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::PackageDb(e.to_string()))?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATE_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    // Legacy records carry local time without a zone marker
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| Error::PackageDb(format!("invalid install date '{value}': {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| Error::PackageDb(format!("invalid local time '{value}'")))
}

fn entry_from_element(element: &BytesStart<'_>) -> Result<PackageEntry> {
    let package = attribute(element, b"package")?
        .ok_or_else(|| Error::PackageDb("entry without package attribute".to_string()))?;
    let version = attribute(element, b"version")?.unwrap_or_default();
    let installed = match attribute(element, b"installed")? {
        Some(value) => parse_date(&value)?,
        None => DateTime::<Utc>::UNIX_EPOCH,
    };
    let mut entry = PackageEntry::new(package, version, installed);
    entry.configure_hash = attribute(element, b"configure-hash")?;
    Ok(entry)
}

fn parse_info(content: &str) -> Result<PackageEntry> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"entry" => {
                return entry_from_element(&e);
            }
            Event::Eof => return Err(Error::PackageDb("no <entry> element".to_string())),
            _ => {}
        }
    }
}

fn parse_legacy(path: &Path) -> Result<HashMap<String, PackageEntry>> {
    let content = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&content);
    reader.trim_text(true);

    let mut entries = HashMap::new();
    let mut current: Option<PackageEntry> = None;
    let mut files: Option<Vec<String>> = None;
    let mut in_file = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"entry" => current = Some(entry_from_element(&e)?),
                b"manifest" => files = Some(Vec::new()),
                b"file" => in_file = true,
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"entry" => {
                let entry = entry_from_element(&e)?;
                entries.insert(entry.package.clone(), entry);
            }
            Event::Text(t) if in_file => {
                if let Some(files) = files.as_mut() {
                    files.push(t.unescape()?.into_owned());
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"file" => in_file = false,
                b"entry" => {
                    if let Some(entry) = current.take() {
                        let _ = entry.manifest.set(files.take());
                        entries.insert(entry.package.clone(), entry);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
