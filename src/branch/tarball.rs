// src/branch/tarball.rs

//! Release tarballs
//!
//! The archive is downloaded into the tarball directory (or used directly
//! when the repository is a local path), verified against the moduleset's
//! hash and unpacked into the checkout root. The pinned version doubles as
//! the tree id.

use super::{Branch, RepositoryRef};
use crate::build::{BuildContext, CommandSpec};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".tar.zst", ".tar", ".zip",
];

#[derive(Debug, Clone)]
pub struct TarballBranch {
    repo: String,
    /// Repository base URL or directory
    href: String,
    /// Archive path relative to `href`, or an absolute URL
    module: String,
    version: String,
    /// `algorithm:hexdigest`, e.g. `sha256:...`
    hash: Option<String>,
    checkoutdir: Option<String>,
    checkoutroot: PathBuf,
    tarballdir: PathBuf,
    srcdir: PathBuf,
}

impl TarballBranch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: impl Into<String>,
        href: impl Into<String>,
        module: impl Into<String>,
        version: impl Into<String>,
        hash: Option<String>,
        checkoutdir: Option<String>,
        checkoutroot: &Path,
        tarballdir: &Path,
    ) -> Self {
        let module = module.into();
        let dirname = checkoutdir
            .clone()
            .unwrap_or_else(|| strip_archive_suffix(file_name(&module)).to_string());
        Self {
            repo: repo.into(),
            href: href.into(),
            module,
            version: version.into(),
            hash,
            checkoutdir,
            checkoutroot: checkoutroot.to_path_buf(),
            tarballdir: tarballdir.to_path_buf(),
            srcdir: checkoutroot.join(dirname),
        }
    }

    /// Full location of the archive
    pub fn url(&self) -> String {
        if self.module.contains("://") || self.module.starts_with('/') {
            return self.module.clone();
        }
        if self.href.is_empty() {
            return self.module.clone();
        }
        format!("{}/{}", self.href.trim_end_matches('/'), self.module)
    }

    fn is_remote(&self) -> bool {
        let url = self.url();
        url.starts_with("http://") || url.starts_with("https://")
    }

    /// Where the archive is (or will be) on disk
    pub fn local_archive(&self) -> PathBuf {
        let url = self.url();
        if self.is_remote() {
            self.tarballdir.join(file_name(&url))
        } else {
            PathBuf::from(url.strip_prefix("file://").unwrap_or(&url))
        }
    }

    fn download(&self, target: &Path) -> Result<()> {
        let url = self.url();
        info!("Downloading {}", url);
        fs::create_dir_all(&self.tarballdir)?;

        let mut response = reqwest::blocking::get(&url)?;
        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let partial = target.with_extension("partial");
        let mut file = File::create(&partial)?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::Download(format!("{url}: {e}")))?;
        file.sync_all()?;
        fs::rename(&partial, target)?;
        Ok(())
    }

    fn verify(&self, archive: &Path) -> Result<()> {
        let Some(hash) = &self.hash else {
            return Ok(());
        };
        let Some((algorithm, expected)) = hash.split_once(':') else {
            warn!("Ignoring malformed hash '{}' for {}", hash, self.module);
            return Ok(());
        };

        let actual = match algorithm {
            "sha256" => digest_file::<Sha256>(archive)?,
            "md5" => digest_file::<Md5>(archive)?,
            other => {
                warn!("Unsupported hash algorithm '{}', skipping verification", other);
                return Ok(());
            }
        };

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::BuildState(format!(
                "{} checksum mismatch for {}: expected {}, got {}",
                algorithm,
                archive.display(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    fn unpack(&self, ctx: &BuildContext, archive: &Path) -> Result<()> {
        fs::create_dir_all(&self.checkoutroot)?;
        let name = file_name(&archive.to_string_lossy()).to_string();
        info!("Unpacking {} into {}", name, self.checkoutroot.display());

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            let reader = GzDecoder::new(BufReader::new(File::open(archive)?));
            tar::Archive::new(reader).unpack(&self.checkoutroot)?;
        } else if name.ends_with(".tar") {
            tar::Archive::new(BufReader::new(File::open(archive)?)).unpack(&self.checkoutroot)?;
        } else {
            ctx.execute(CommandSpec::argv(
                [
                    "tar".to_string(),
                    "-xf".to_string(),
                    archive.to_string_lossy().into_owned(),
                    "-C".to_string(),
                    self.checkoutroot.to_string_lossy().into_owned(),
                ],
                &self.checkoutroot,
            ))?;
        }

        if !self.srcdir.is_dir() {
            return Err(Error::BuildState(format!(
                "unpacking {} did not create {}",
                name,
                self.srcdir.display()
            )));
        }
        Ok(())
    }

    fn fetch(&self, ctx: &BuildContext) -> Result<()> {
        let archive = self.local_archive();
        if self.is_remote() && !archive.exists() {
            self.download(&archive)?;
        }
        if !archive.exists() {
            return Err(Error::BuildState(format!(
                "tarball {} does not exist",
                archive.display()
            )));
        }
        self.verify(&archive)?;
        self.unpack(ctx, &archive)
    }
}

impl Branch for TarballBranch {
    fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    fn checkoutdir(&self) -> Option<&str> {
        self.checkoutdir.as_deref()
    }

    fn tree_id(&self) -> Option<String> {
        Some(self.version.clone())
    }

    fn version(&self) -> Option<&str> {
        Some(&self.version)
    }

    fn may_checkout(&self, ctx: &BuildContext) -> bool {
        !ctx.config().nonetwork || !self.is_remote() || self.local_archive().exists()
    }

    fn checkout(&self, ctx: &BuildContext) -> Result<()> {
        if self.srcdir.is_dir() {
            return Ok(());
        }
        self.fetch(ctx)
    }

    fn force_checkout(&self, ctx: &BuildContext) -> Result<()> {
        if self.srcdir.exists() {
            fs::remove_dir_all(&self.srcdir)?;
        }
        self.fetch(ctx)
    }

    fn is_tarball(&self) -> bool {
        true
    }

    fn repository(&self) -> RepositoryRef {
        RepositoryRef {
            kind: "tarball",
            name: self.repo.clone(),
            href: self.href.clone(),
        }
    }

    fn branch_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("module", self.module.clone()),
            ("version", self.version.clone()),
        ];
        if let Some(hash) = &self.hash {
            attrs.push(("hash", hash.clone()));
        }
        if let Some(dir) = &self.checkoutdir {
            attrs.push(("checkoutdir", dir.clone()));
        }
        attrs
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn strip_archive_suffix(name: &str) -> &str {
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
