// src/moduleset/loader.rs

//! Moduleset XML loading
//!
//! Files are read into a small element tree, `<if>` blocks are spliced
//! against the configured conditions, `<include>` elements are followed
//! relative to the including file, and every module element becomes a
//! [`Package`] tagged with the stem of the file that defined it.

use super::ModuleSet;
use crate::branch::{Branch, LocalBranch, SystemBranch, TarballBranch};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::modtypes::{Autotools, CMake, Distutils, Meson, ModuleKind, TestModule};
use crate::package::{Package, SystemDependency};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load every moduleset named in the configuration
pub fn load(config: &Config) -> Result<ModuleSet> {
    if config.moduleset.is_empty() {
        return Err(Error::Usage("no moduleset configured".to_string()));
    }
    let mut set = ModuleSet::new(config);
    let mut loader = Loader::new(config);
    for name in &config.moduleset {
        loader.load_file(&moduleset_path(name, config), &mut set)?;
    }
    info!("Loaded {} module(s)", set.len());
    Ok(set)
}

/// Moduleset names without a path refer to `<name>.modules` next to the
/// configuration file
fn moduleset_path(name: &str, config: &Config) -> PathBuf {
    if name.contains('/') {
        return PathBuf::from(name);
    }
    let file = if name.ends_with(".modules") {
        name.to_string()
    } else {
        format!("{name}.modules")
    };
    match config.source().and_then(Path::parent) {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}

/// Minimal DOM for moduleset documents
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub(crate) name: String,
    attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            Error::Moduleset(format!("<{}> is missing the '{}' attribute", self.name, name))
        })
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.attr(name)
            .map(|value| matches!(value, "yes" | "true" | "1"))
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attribute value, or the `value` of a child element of that name
    fn setting(&self, name: &str) -> Option<String> {
        self.attr(name)
            .map(str::to_string)
            .or_else(|| self.child(name).and_then(|c| c.attr("value")).map(str::to_string))
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Moduleset(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        attrs.push((key, attr.unescape_value()?.into_owned()));
    }
    Ok(Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

pub(crate) fn parse_document(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element_from(&e)?),
            Event::Empty(e) => {
                let element = element_from(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(Error::Moduleset("unbalanced end tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => return Err(Error::Moduleset("no document element".to_string())),
            _ => {}
        }
    }
}

/// Replace `<if>` elements by their children when the condition holds
fn splice_conditions(children: Vec<Element>, conditions: &BTreeSet<String>) -> Result<Vec<Element>> {
    let mut result = Vec::with_capacity(children.len());
    for mut child in children {
        if child.name != "if" {
            child.children = splice_conditions(child.children, conditions)?;
            result.push(child);
            continue;
        }
        let holds = match (child.attr("condition-set"), child.attr("condition-unset")) {
            (Some(set), None) => conditions.contains(set),
            (None, Some(unset)) => !conditions.contains(unset),
            _ => {
                return Err(Error::Moduleset(
                    "<if> needs exactly one of condition-set or condition-unset".to_string(),
                ));
            }
        };
        if holds {
            result.extend(splice_conditions(child.children, conditions)?);
        }
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepoKind {
    Local,
    Tarball,
    System,
}

#[derive(Debug, Clone)]
struct Repository {
    kind: RepoKind,
    name: String,
    href: String,
}

struct Loader<'c> {
    config: &'c Config,
    loaded: HashSet<PathBuf>,
}

impl<'c> Loader<'c> {
    fn new(config: &'c Config) -> Self {
        Self {
            config,
            loaded: HashSet::new(),
        }
    }

    fn load_file(&mut self, path: &Path, set: &mut ModuleSet) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            Error::Moduleset(format!("could not read {}: {}", path.display(), e))
        })?;
        if !self.loaded.insert(canonical.clone()) {
            debug!("{} already loaded", path.display());
            return Ok(());
        }
        let content = fs::read_to_string(&canonical)?;
        let root = parse_document(&content)
            .map_err(|e| Error::Moduleset(format!("{}: {}", path.display(), e)))?;
        if root.name != "moduleset" {
            return Err(Error::Moduleset(format!(
                "{}: document element is <{}>, expected <moduleset>",
                path.display(),
                root.name
            )));
        }

        let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = canonical
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let children = splice_conditions(root.children, &self.config.conditions)?;
        debug!("Parsing moduleset {}", canonical.display());

        let mut repositories: HashMap<String, Repository> = HashMap::new();
        let mut default_repo: Option<String> = None;
        for node in children.iter().filter(|n| n.name == "repository") {
            let repo = parse_repository(node, &base)?;
            if node.flag("default") == Some(true) {
                default_repo = Some(repo.name.clone());
            }
            repositories.insert(repo.name.clone(), repo);
        }

        for node in &children {
            match node.name.as_str() {
                "repository" => {}
                "include" => {
                    let href = node.required("href")?;
                    self.load_file(&base.join(href), set)?;
                }
                _ => {
                    let mut package =
                        self.parse_module(node, &repositories, default_repo.as_deref(), &base)?;
                    if !package.tags.contains(&stem) {
                        package.tags.push(stem.clone());
                    }
                    set.add(package);
                }
            }
        }
        Ok(())
    }

    fn parse_module(
        &self,
        node: &Element,
        repositories: &HashMap<String, Repository>,
        default_repo: Option<&str>,
        base: &Path,
    ) -> Result<Package> {
        let id = node.required("id")?.to_string();
        let kind = match node.name.as_str() {
            "autotools" | "tarball" => ModuleKind::Autotools(parse_autotools(node)),
            "meson" => ModuleKind::Meson(Meson {
                mesonargs: node.setting("mesonargs").unwrap_or_default(),
                ninjaargs: node.setting("ninjaargs").unwrap_or_default(),
                skip_install: node.flag("skip-install").unwrap_or(false),
            }),
            "cmake" => ModuleKind::CMake(CMake {
                cmakeargs: node.setting("cmakeargs").unwrap_or_default(),
                makeargs: node.setting("makeargs").unwrap_or_default(),
                ninjaargs: node.setting("ninjaargs").unwrap_or_default(),
                use_ninja: node.flag("use-ninja"),
                skip_install: node.flag("skip-install").unwrap_or(false),
            }),
            "distutils" => ModuleKind::Distutils(Distutils {
                python: node.attr("python").map(str::to_string),
            }),
            "systemmodule" => ModuleKind::System,
            "metamodule" => ModuleKind::Meta,
            "testmodule" => ModuleKind::Test(TestModule {
                test_type: node.attr("type").unwrap_or_default().to_string(),
                command: node.setting("command"),
            }),
            other => {
                return Err(Error::Moduleset(format!("unknown module type <{other}>")));
            }
        };

        let mut package = Package::new(id.clone(), kind);
        package.branch = self.parse_branch(node, &id, repositories, default_repo, base)?;
        package.dependencies = dep_list(node, "dependencies")?;
        package.suggests = dep_list(node, "suggests")?;
        package.after = dep_list(node, "after")?;
        package.pkg_config = node
            .child("pkg-config")
            .map(|c| c.text.trim().to_string())
            .filter(|pc| !pc.is_empty());
        if let Some(sysdeps) = node.child("systemdependencies") {
            package.systemdependencies = sysdeps
                .children
                .iter()
                .filter(|c| c.name == "dep")
                .map(parse_sysdep)
                .collect::<Result<_>>()?;
        }
        Ok(package)
    }

    fn parse_branch(
        &self,
        node: &Element,
        id: &str,
        repositories: &HashMap<String, Repository>,
        default_repo: Option<&str>,
        base: &Path,
    ) -> Result<Option<Box<dyn Branch>>> {
        let config = self.config;
        match node.name.as_str() {
            "metamodule" => return Ok(None),
            "tarball" => {
                let source = node.child("source").ok_or_else(|| {
                    Error::Moduleset(format!("tarball module {id} has no <source>"))
                })?;
                let href = resolve_href(source.required("href")?, base);
                let version = node.attr("version").unwrap_or_default();
                let branch = TarballBranch::new(
                    id,
                    "",
                    href,
                    version,
                    source.attr("hash").map(str::to_string),
                    node.attr("checkoutdir").map(str::to_string),
                    &config.checkoutroot,
                    &config.tarballdir(),
                );
                return Ok(Some(Box::new(branch)));
            }
            _ => {}
        }

        let branch_node = node.child("branch");
        let repo_name = branch_node
            .and_then(|b| b.attr("repo"))
            .or(default_repo);
        let repo = match repo_name {
            Some(name) => Some(repositories.get(name).ok_or_else(|| {
                Error::Moduleset(format!("module {id} refers to unknown repository '{name}'"))
            })?),
            None => None,
        };

        let attr = |name: &str| branch_node.and_then(|b| b.attr(name)).map(str::to_string);
        let module = attr("module").unwrap_or_else(|| id.to_string());
        let checkoutdir = attr("checkoutdir");

        let branch: Box<dyn Branch> = match (repo, node.name.as_str()) {
            (None, "systemmodule") => Box::new(SystemBranch::new(
                "system",
                config.checkoutroot.join(id),
                attr("version"),
            )),
            (None, _) => {
                return Err(Error::Moduleset(format!(
                    "module {id} has no branch and there is no default repository"
                )));
            }
            (Some(repo), _) => match repo.kind {
                RepoKind::System => Box::new(SystemBranch::new(
                    repo.name.clone(),
                    config.checkoutroot.join(id),
                    attr("version"),
                )),
                RepoKind::Local => Box::new(
                    LocalBranch::new(
                        repo.name.clone(),
                        repo.href.clone(),
                        module,
                        &config.checkoutroot,
                        checkoutdir,
                    )
                    .for_package(id),
                ),
                RepoKind::Tarball => Box::new(TarballBranch::new(
                    repo.name.clone(),
                    repo.href.clone(),
                    module,
                    attr("version").unwrap_or_default(),
                    attr("hash"),
                    checkoutdir,
                    &config.checkoutroot,
                    &config.tarballdir(),
                )),
            },
        };
        Ok(Some(branch))
    }
}

fn parse_autotools(node: &Element) -> Autotools {
    let defaults = Autotools::default();
    Autotools {
        autogenargs: node.setting("autogenargs").unwrap_or_default(),
        makeargs: node.setting("makeargs").unwrap_or_default(),
        makeinstallargs: node.setting("makeinstallargs"),
        autogen_sh: node.attr("autogen-sh").map(str::to_string).unwrap_or(defaults.autogen_sh),
        skip_autogen: node.flag("skip-autogen").unwrap_or(false),
        supports_non_srcdir_builds: node
            .flag("supports-non-srcdir-builds")
            .unwrap_or(defaults.supports_non_srcdir_builds),
        check_target: node.flag("check-target").unwrap_or(defaults.check_target),
    }
}

fn parse_repository(node: &Element, base: &Path) -> Result<Repository> {
    let name = node.required("name")?.to_string();
    let kind = match node.required("type")? {
        "local" => RepoKind::Local,
        "tarball" => RepoKind::Tarball,
        "system" => RepoKind::System,
        other => {
            return Err(Error::Moduleset(format!(
                "repository {name} has unsupported type '{other}'"
            )));
        }
    };
    let href = node.attr("href").unwrap_or_default();
    let href = if kind == RepoKind::Local {
        resolve_href(href, base)
    } else {
        href.to_string()
    };
    Ok(Repository { kind, name, href })
}

/// Relative filesystem references are relative to the moduleset file
fn resolve_href(href: &str, base: &Path) -> String {
    if href.is_empty() || href.contains("://") || Path::new(href).is_absolute() {
        href.to_string()
    } else {
        base.join(href).to_string_lossy().into_owned()
    }
}

fn dep_list(node: &Element, section: &str) -> Result<Vec<String>> {
    let Some(list) = node.child(section) else {
        return Ok(Vec::new());
    };
    list.children
        .iter()
        .filter(|c| c.name == "dep")
        .map(|dep| dep.required("package").map(str::to_string))
        .collect()
}

fn parse_sysdep(node: &Element) -> Result<SystemDependency> {
    let mut dep = SystemDependency::new(node.required("type")?.parse()?, node.required("value")?);
    dep.alternatives = node
        .children
        .iter()
        .filter(|c| c.name == "altdep")
        .map(|alt| {
            Ok(SystemDependency::new(
                alt.required("type")?.parse()?,
                alt.required("value")?,
            ))
        })
        .collect::<Result<_>>()?;
    Ok(dep)
}
