//! `pyproject.toml` reader: the `[project]` table (PEP 621), `[build-system]`,
//! and the backend's own `[tool.kiln]` table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use toml_edit::{DocumentMut, Item, TableLike, Value};
use tracing::debug;

use crate::error::ProjectError;
use crate::project::{
    BuildSystem, FormatSet, IncludeSpec, License, PackageSpec, Person, ProjectModel, Readme,
    ToolConfig, CONSOLE_SCRIPTS_GROUP, GUI_SCRIPTS_GROUP,
};

pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const TOOL_TABLE: &str = "kiln";

type Result<T> = std::result::Result<T, ProjectError>;

/// Reads `<root>/pyproject.toml` and resolves it into a [`ProjectModel`].
pub fn load_project(root: &Path) -> Result<ProjectModel> {
    let root = root.canonicalize().map_err(|source| ProjectError::Read {
        path: root.to_path_buf(),
        source,
    })?;
    let path = root.join(PYPROJECT_FILE);
    if !path.is_file() {
        return Err(ProjectError::MissingPyproject { root });
    }
    let contents = fs::read_to_string(&path).map_err(|source| ProjectError::Read {
        path: path.clone(),
        source,
    })?;
    parse_project(&root, &contents)
}

/// Resolves already-loaded `pyproject.toml` contents. Readme and license files
/// referenced by the document are read relative to `root`.
pub fn parse_project(root: &Path, contents: &str) -> Result<ProjectModel> {
    let doc: DocumentMut = contents.parse().map_err(|err| ProjectError::Parse {
        path: root.join(PYPROJECT_FILE),
        message: format!("{err}"),
    })?;
    let mut model = ProjectModel::new(root);
    model.build_system = read_build_system(&doc)?;

    if let Some(project) = doc.get("project").and_then(Item::as_table_like) {
        model.name = optional_str(project, "name", "project.name")?;
        model.version = optional_str(project, "version", "project.version")?;
        model.description = optional_str(project, "description", "project.description")?;
        model.requires_python =
            optional_str(project, "requires-python", "project.requires-python")?;
        model.readme = read_readme(root, project)?;
        model.license = read_license(root, project)?;
        model.authors = read_people(project, "authors")?;
        model.maintainers = read_people(project, "maintainers")?;
        model.keywords = string_array(project, "keywords", "project.keywords")?;
        model.classifiers = string_array(project, "classifiers", "project.classifiers")?;
        model.urls = string_table(project, "urls", "project.urls")?;
        model.dependencies = string_array(project, "dependencies", "project.dependencies")?;
        model.optional_dependencies = read_optional_dependencies(project)?;
        model.entry_points = read_entry_points(project)?;
    } else {
        debug!(root = %root.display(), "pyproject has no [project] table");
    }

    let tool = doc
        .get("tool")
        .and_then(Item::as_table_like)
        .and_then(|tool| tool.get(TOOL_TABLE))
        .and_then(Item::as_table_like);
    if let Some(tool) = tool {
        model.packages = read_packages(tool)?;
        model.includes = read_includes(tool)?;
        model.excludes = string_array(tool, "exclude", "tool.kiln.exclude")?;
        model.tool = ToolConfig {
            tag: optional_str(tool, "tag", "tool.kiln.tag")?,
        };
    }
    if model.packages.is_empty() {
        if let Some(name) = model.name.as_deref() {
            model.packages = detect_packages(root, name);
        }
    }
    Ok(model)
}

fn read_build_system(doc: &DocumentMut) -> Result<BuildSystem> {
    let Some(table) = doc.get("build-system").and_then(Item::as_table_like) else {
        return Ok(BuildSystem::default());
    };
    Ok(BuildSystem {
        requires: string_array(table, "requires", "build-system.requires")?,
        backend: optional_str(table, "build-backend", "build-system.build-backend")?,
    })
}

fn read_readme(root: &Path, project: &dyn TableLike) -> Result<Option<Readme>> {
    let Some(item) = project.get("readme") else {
        return Ok(None);
    };
    if let Some(file) = item.as_str() {
        let path = PathBuf::from(file);
        let text = read_project_file(root, &path)?;
        return Ok(Some(Readme {
            content_type: Readme::content_type_for(&path).to_string(),
            path: Some(path),
            text,
        }));
    }
    let table = item
        .as_table_like()
        .ok_or_else(|| ProjectError::invalid("project.readme", "expected a string or table"))?;
    let content_type = optional_str(table, "content-type", "project.readme.content-type")?;
    if let Some(file) = optional_str(table, "file", "project.readme.file")? {
        let path = PathBuf::from(file);
        let text = read_project_file(root, &path)?;
        return Ok(Some(Readme {
            content_type: content_type
                .unwrap_or_else(|| Readme::content_type_for(&path).to_string()),
            path: Some(path),
            text,
        }));
    }
    if let Some(text) = optional_str(table, "text", "project.readme.text")? {
        return Ok(Some(Readme {
            path: None,
            content_type: content_type.unwrap_or_else(|| "text/plain".to_string()),
            text,
        }));
    }
    Err(ProjectError::invalid(
        "project.readme",
        "table needs either `file` or `text`",
    ))
}

fn read_license(root: &Path, project: &dyn TableLike) -> Result<Option<License>> {
    let Some(item) = project.get("license") else {
        return Ok(None);
    };
    if let Some(text) = item.as_str() {
        return Ok(Some(License {
            text: text.to_string(),
            file: None,
        }));
    }
    let table = item
        .as_table_like()
        .ok_or_else(|| ProjectError::invalid("project.license", "expected a string or table"))?;
    if let Some(file) = optional_str(table, "file", "project.license.file")? {
        let path = PathBuf::from(file);
        let text = read_project_file(root, &path)?;
        return Ok(Some(License {
            text,
            file: Some(path),
        }));
    }
    if let Some(text) = optional_str(table, "text", "project.license.text")? {
        return Ok(Some(License { text, file: None }));
    }
    Err(ProjectError::invalid(
        "project.license",
        "table needs either `file` or `text`",
    ))
}

fn read_people(project: &dyn TableLike, key: &str) -> Result<Vec<Person>> {
    let label = format!("project.{key}");
    let Some(item) = project.get(key) else {
        return Ok(Vec::new());
    };
    let tables = table_entries(item)
        .ok_or_else(|| ProjectError::invalid(&label, "expected an array of tables"))?;
    let mut people = Vec::with_capacity(tables.len());
    for table in tables {
        let person = Person {
            name: optional_str(table, "name", &label)?,
            email: optional_str(table, "email", &label)?,
        };
        if person.name.is_none() && person.email.is_none() {
            return Err(ProjectError::invalid(
                &label,
                "each entry needs a `name` or an `email`",
            ));
        }
        people.push(person);
    }
    Ok(people)
}

fn read_optional_dependencies(project: &dyn TableLike) -> Result<BTreeMap<String, Vec<String>>> {
    let mut extras = BTreeMap::new();
    let Some(table) = project
        .get("optional-dependencies")
        .and_then(Item::as_table_like)
    else {
        return Ok(extras);
    };
    for (extra, _) in table.iter() {
        let deps = string_array(table, extra, "project.optional-dependencies")?;
        extras.insert(extra.to_string(), deps);
    }
    Ok(extras)
}

fn read_entry_points(
    project: &dyn TableLike,
) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
    let mut groups = BTreeMap::new();
    for (key, group) in [
        ("scripts", CONSOLE_SCRIPTS_GROUP),
        ("gui-scripts", GUI_SCRIPTS_GROUP),
    ] {
        let entries = string_table(project, key, &format!("project.{key}"))?;
        if !entries.is_empty() {
            groups.insert(group.to_string(), entries);
        }
    }
    let Some(table) = project.get("entry-points").and_then(Item::as_table_like) else {
        return Ok(groups);
    };
    for (group, _) in table.iter() {
        if group == CONSOLE_SCRIPTS_GROUP || group == GUI_SCRIPTS_GROUP {
            return Err(ProjectError::invalid(
                format!("project.entry-points.{group}"),
                "use [project.scripts] or [project.gui-scripts] instead",
            ));
        }
        let entries = string_table(table, group, &format!("project.entry-points.{group}"))?;
        if !entries.is_empty() {
            groups.insert(group.to_string(), entries);
        }
    }
    Ok(groups)
}

fn read_packages(tool: &dyn TableLike) -> Result<Vec<PackageSpec>> {
    let Some(item) = tool.get("packages") else {
        return Ok(Vec::new());
    };
    let tables = table_entries(item)
        .ok_or_else(|| ProjectError::invalid("tool.kiln.packages", "expected an array of tables"))?;
    let mut packages = Vec::with_capacity(tables.len());
    for table in tables {
        let include = optional_str(table, "include", "tool.kiln.packages")?.ok_or_else(|| {
            ProjectError::invalid("tool.kiln.packages", "each package needs `include`")
        })?;
        packages.push(PackageSpec {
            include,
            from: optional_str(table, "from", "tool.kiln.packages")?,
            formats: read_formats(table, "tool.kiln.packages")?.unwrap_or(FormatSet::BOTH),
        });
    }
    Ok(packages)
}

fn read_includes(tool: &dyn TableLike) -> Result<Vec<IncludeSpec>> {
    let Some(array) = tool.get("include") else {
        return Ok(Vec::new());
    };
    let array = array
        .as_array()
        .ok_or_else(|| ProjectError::invalid("tool.kiln.include", "expected an array"))?;
    let mut includes = Vec::with_capacity(array.len());
    for value in array {
        if let Some(pattern) = value.as_str() {
            includes.push(IncludeSpec::new(pattern, FormatSet::SDIST));
            continue;
        }
        let table = value.as_inline_table().ok_or_else(|| {
            ProjectError::invalid("tool.kiln.include", "entries must be strings or tables")
        })?;
        let pattern = optional_str(table, "path", "tool.kiln.include")?.ok_or_else(|| {
            ProjectError::invalid("tool.kiln.include", "table entries need `path`")
        })?;
        let formats = read_formats(table, "tool.kiln.include")?.unwrap_or(FormatSet::SDIST);
        includes.push(IncludeSpec::new(pattern, formats));
    }
    Ok(includes)
}

fn read_formats(table: &dyn TableLike, label: &str) -> Result<Option<FormatSet>> {
    let Some(item) = table.get("format") else {
        return Ok(None);
    };
    let names: Vec<&str> = if let Some(single) = item.as_str() {
        vec![single]
    } else if let Some(array) = item.as_array() {
        array
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .ok_or_else(|| ProjectError::invalid(label, "format entries must be strings"))
            })
            .collect::<Result<_>>()?
    } else {
        return Err(ProjectError::invalid(
            label,
            "format must be a string or an array",
        ));
    };
    let mut formats = FormatSet {
        sdist: false,
        wheel: false,
    };
    for name in names {
        match name {
            "sdist" => formats.sdist = true,
            "wheel" => formats.wheel = true,
            other => {
                return Err(ProjectError::invalid(
                    label,
                    format!("unknown format `{other}` (expected `sdist` or `wheel`)"),
                ))
            }
        }
    }
    Ok(Some(formats))
}

/// Mirrors the usual layouts: `<module>/`, `<module>.py`, `src/<module>/`, `src/<module>.py`.
fn detect_packages(root: &Path, name: &str) -> Vec<PackageSpec> {
    let module = module_name(name);
    for from in [None, Some("src")] {
        let base = from.map_or_else(|| root.to_path_buf(), |dir| root.join(dir));
        for candidate in [module.clone(), format!("{module}.py")] {
            if base.join(&candidate).exists() {
                let mut spec = PackageSpec::new(candidate);
                spec.from = from.map(ToString::to_string);
                debug!(package = %spec.include, from = ?spec.from, "detected package layout");
                return vec![spec];
            }
        }
    }
    debug!(module = %module, "no package directory detected");
    Vec::new()
}

fn module_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .map(|ch| if matches!(ch, '-' | '.' | ' ') { '_' } else { ch })
        .collect()
}

fn read_project_file(root: &Path, relative: &Path) -> Result<String> {
    let path = root.join(relative);
    fs::read_to_string(&path).map_err(|source| ProjectError::Read { path, source })
}

fn optional_str(table: &dyn TableLike, key: &str, label: &str) -> Result<Option<String>> {
    match table.get(key) {
        None => Ok(None),
        Some(item) => item
            .as_str()
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| ProjectError::invalid(format!("{label}.{key}"), "expected a string")),
    }
}

fn string_array(table: &dyn TableLike, key: &str, label: &str) -> Result<Vec<String>> {
    let Some(item) = table.get(key) else {
        return Ok(Vec::new());
    };
    let array = item
        .as_array()
        .ok_or_else(|| ProjectError::invalid(label, "expected an array of strings"))?;
    array
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(ToString::to_string)
                .ok_or_else(|| ProjectError::invalid(label, "expected an array of strings"))
        })
        .collect()
}

fn string_table(table: &dyn TableLike, key: &str, label: &str) -> Result<BTreeMap<String, String>> {
    let mut mapped = BTreeMap::new();
    let Some(item) = table.get(key) else {
        return Ok(mapped);
    };
    let inner = item
        .as_table_like()
        .ok_or_else(|| ProjectError::invalid(label, "expected a table of strings"))?;
    for (name, value) in inner.iter() {
        let target = value
            .as_str()
            .ok_or_else(|| ProjectError::invalid(format!("{label}.{name}"), "expected a string"))?;
        mapped.insert(name.to_string(), target.to_string());
    }
    Ok(mapped)
}

/// Accepts both inline-table arrays and `[[array.of.tables]]`.
fn table_entries(item: &Item) -> Option<Vec<&dyn TableLike>> {
    if let Some(array) = item.as_array() {
        return array
            .iter()
            .map(|value: &Value| value.as_inline_table().map(|t| t as &dyn TableLike))
            .collect();
    }
    item.as_array_of_tables()
        .map(|tables| tables.iter().map(|t| t as &dyn TableLike).collect())
}
