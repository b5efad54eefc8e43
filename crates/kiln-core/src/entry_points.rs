//! `entry_points.txt` and console-script launcher stubs.

use std::collections::BTreeMap;

use kiln_domain::{ProjectModel, CONSOLE_SCRIPTS_GROUP};

use crate::error::{BuildError, Result};
use crate::hash::FileEntry;
use crate::naming::{validate_archive_path, DistributionName};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub group: String,
    pub name: String,
    pub module: String,
    /// Dotted attribute path inside `module`.
    pub attr: String,
    pub extras: Vec<String>,
}

impl EntryPoint {
    /// `module:attr`, followed by ` [extra,...]` when extras are declared.
    pub fn target(&self) -> String {
        let mut target = format!("{}:{}", self.module, self.attr);
        if !self.extras.is_empty() {
            target.push_str(&format!(" [{}]", self.extras.join(",")));
        }
        target
    }
}

/// Every declared entry point, validated and grouped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryPointRegistry {
    groups: BTreeMap<String, Vec<EntryPoint>>,
}

impl EntryPointRegistry {
    pub fn from_model(model: &ProjectModel) -> Result<Self> {
        let mut groups = BTreeMap::new();
        for (group, entries) in &model.entry_points {
            if entries.is_empty() {
                continue;
            }
            let parsed = entries
                .iter()
                .map(|(name, target)| parse_entry_point(group, name, target))
                .collect::<Result<Vec<_>>>()?;
            groups.insert(group.clone(), parsed);
        }
        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `[group]` headers, `name = target` lines, a blank line after each group.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (group, entries) in &self.groups {
            out.push_str(&format!("[{group}]\n"));
            for entry in entries {
                out.push_str(&format!("{} = {}\n", entry.name, entry.target()));
            }
            out.push('\n');
        }
        Some(out)
    }

    pub fn console_scripts(&self) -> &[EntryPoint] {
        self.groups
            .get(CONSOLE_SCRIPTS_GROUP)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub fn parse_entry_point(group: &str, name: &str, target: &str) -> Result<EntryPoint> {
    let malformed = |reason: &str| BuildError::EntryPoint {
        group: group.to_string(),
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(malformed("entry point name is empty"));
    }
    if name.contains(['=', '[', '\n', '\r']) {
        return Err(malformed("entry point name contains `=`, `[` or a line break"));
    }
    if group == CONSOLE_SCRIPTS_GROUP
        && (name.contains(['/', '\\']) || name == "." || name == "..")
    {
        return Err(malformed("script names must be plain file names"));
    }

    let target = target.trim();
    let (reference, extras) = match target.find('[') {
        Some(open) => {
            let Some(inner) = target[open..]
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            else {
                return Err(malformed("extras must be a trailing `[extra,...]` list"));
            };
            let extras = inner
                .split(',')
                .map(str::trim)
                .filter(|extra| !extra.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            if extras.iter().any(|extra| !is_identifier(&extra.replace(['-', '.'], "_"))) {
                return Err(malformed("extras must be valid extra names"));
            }
            (target[..open].trim_end(), extras)
        }
        None => (target, Vec::new()),
    };

    let mut parts = reference.split(':');
    let (Some(module), Some(attr), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed("target must have the form `module:attribute`"));
    };
    let (module, attr) = (module.trim(), attr.trim());
    if !is_dotted_identifier(module) {
        return Err(malformed("module path must be a dotted Python identifier"));
    }
    if !is_dotted_identifier(attr) {
        return Err(malformed("attribute path must be a dotted Python identifier"));
    }
    Ok(EntryPoint {
        group: group.to_string(),
        name: name.to_string(),
        module: module.to_string(),
        attr: attr.to_string(),
        extras,
    })
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_alphabetic())
        && chars.all(|ch| ch == '_' || ch.is_alphanumeric())
}

fn is_dotted_identifier(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Python launcher for a console script. `#!python` is rewritten by installers.
pub fn launcher_stub(entry: &EntryPoint) -> String {
    let module = &entry.module;
    let parts: Vec<&str> = entry.attr.split('.').collect();
    let parts_repr = format!("{parts:?}");
    format!(
        "#!python\nimport importlib\nimport sys\n\ndef _load():\n    module = importlib.import_module({module:?})\n    target = module\n    for attr in {parts_repr}:\n        target = getattr(target, attr)\n    return target\n\nif __name__ == '__main__':\n    sys.exit(_load()())\n"
    )
}

/// Executable `<dist>.data/scripts/<name>` members, one per console script.
pub fn launcher_members(
    registry: &EntryPointRegistry,
    dist: &DistributionName,
) -> Result<Vec<FileEntry>> {
    let scripts_dir = format!("{}/scripts", dist.data_dir());
    registry
        .console_scripts()
        .iter()
        .map(|entry| {
            let path = format!("{scripts_dir}/{}", entry.name);
            validate_archive_path(&path)?;
            Ok(FileEntry::inline(path, launcher_stub(entry)).with_executable(true))
        })
        .collect()
}
