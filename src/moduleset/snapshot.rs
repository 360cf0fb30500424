// src/moduleset/snapshot.rs

//! Moduleset snapshots
//!
//! Writes packages back out as a self-contained moduleset document: one
//! `<repository>` per repository referenced, then one element per module
//! with its type attributes, branch and dependency lists.

use crate::package::{Package, SystemDependency};
use std::fmt::Write;

fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

fn attrs_string(attrs: &[(&str, String)]) -> String {
    attrs
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", key, escape(value)))
        .collect()
}

pub(crate) fn write(modules: &[&Package]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<moduleset>\n");

    let mut repos: Vec<String> = Vec::new();
    for pkg in modules {
        let Some(branch) = &pkg.branch else { continue };
        let repo = branch.repository();
        if repos.contains(&repo.name) {
            continue;
        }
        let mut attrs = vec![("type", repo.kind.to_string()), ("name", repo.name.clone())];
        if !repo.href.is_empty() {
            attrs.push(("href", repo.href.clone()));
        }
        let _ = writeln!(xml, "  <repository{}/>", attrs_string(&attrs));
        repos.push(repo.name);
    }

    for pkg in modules {
        write_module(&mut xml, pkg);
    }
    xml.push_str("</moduleset>\n");
    xml
}

fn write_module(xml: &mut String, pkg: &Package) {
    let (tag, type_attrs) = pkg.kind.xml_tag_and_attrs();
    let mut attrs = vec![("id", pkg.name.clone())];
    attrs.extend(type_attrs);
    let _ = writeln!(xml, "  <{}{}>", tag, attrs_string(&attrs));

    if let Some(branch) = &pkg.branch {
        let mut branch_attrs = vec![("repo", branch.repository().name)];
        branch_attrs.extend(branch.branch_attrs());
        let _ = writeln!(xml, "    <branch{}/>", attrs_string(&branch_attrs));
    }

    for (section, deps) in [
        ("dependencies", &pkg.dependencies),
        ("suggests", &pkg.suggests),
        ("after", &pkg.after),
    ] {
        if deps.is_empty() {
            continue;
        }
        let _ = writeln!(xml, "    <{section}>");
        for dep in deps {
            let _ = writeln!(xml, "      <dep package=\"{}\"/>", escape(dep));
        }
        let _ = writeln!(xml, "    </{section}>");
    }

    if let Some(pc) = &pkg.pkg_config {
        let _ = writeln!(xml, "    <pkg-config>{}</pkg-config>", escape(pc));
    }

    if !pkg.systemdependencies.is_empty() {
        xml.push_str("    <systemdependencies>\n");
        for dep in &pkg.systemdependencies {
            write_sysdep(xml, dep);
        }
        xml.push_str("    </systemdependencies>\n");
    }

    let _ = writeln!(xml, "  </{tag}>");
}

fn write_sysdep(xml: &mut String, dep: &SystemDependency) {
    let head = format!(
        "      <dep type=\"{}\" value=\"{}\"",
        dep.kind,
        escape(&dep.value)
    );
    if dep.alternatives.is_empty() {
        let _ = writeln!(xml, "{head}/>");
        return;
    }
    let _ = writeln!(xml, "{head}>");
    for alt in &dep.alternatives {
        let _ = writeln!(
            xml,
            "        <altdep type=\"{}\" value=\"{}\"/>",
            alt.kind,
            escape(&alt.value)
        );
    }
    xml.push_str("      </dep>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::LocalBranch;
    use crate::modtypes::ModuleKind;
    use crate::moduleset::loader::parse_document;
    use crate::package::SysDepKind;
    use std::path::Path;

    #[test]
    fn test_snapshot_document() {
        let branch = LocalBranch::new("src", "/srv/src", "glib", Path::new("/co"), None);
        let mut glib = Package::new("glib", ModuleKind::autotools())
            .with_branch(Box::new(branch))
            .with_dependencies(&["zlib"])
            .with_pkg_config("glib-2.0.pc");
        glib.systemdependencies.push(SystemDependency {
            kind: SysDepKind::Path,
            value: "msgfmt".to_string(),
            alternatives: vec![SystemDependency::new(SysDepKind::Path, "gmsgfmt")],
        });
        let meta = Package::new("meta & co", ModuleKind::Meta).with_after(&["glib"]);

        let xml = write(&[&glib, &meta]);
        assert!(xml.contains("<repository type=\"local\" name=\"src\" href=\"/srv/src\"/>"));
        assert!(xml.contains("<branch repo=\"src\" module=\"glib\"/>"));
        assert!(xml.contains("<metamodule id=\"meta &amp; co\">"));

        let root = parse_document(&xml).unwrap();
        assert_eq!(root.name, "moduleset");
        let tags: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(tags, vec!["repository", "autotools", "metamodule"]);
        let glib_node = &root.children[1];
        let names: Vec<&str> = glib_node.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["branch", "dependencies", "pkg-config", "systemdependencies"]
        );
    }
}
