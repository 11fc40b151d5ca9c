//! Package descriptors: the formula-like TOML file that says what to fetch,
//! which digest to expect, what to copy where, and how to smoke-test it.
//!
//! Templated fields are resolved exactly once, in [`Descriptor::load`]; the
//! resulting [`Descriptor`] is immutable.

pub mod template;
pub mod vars;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::archive::ArchiveFormat;
use crate::checksum::Sha256Digest;
use crate::error::DescriptorError;
use crate::platform::Platform;
use crate::url_model;
use template::TemplateContext;
use vars::VariableSource;

/// Where an install step puts its file, relative to the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// `<prefix>/bin`, mode forced to include `0o755`.
    Executable,
    /// `<prefix>/lib`
    Library,
    /// `<prefix>/include`
    Include,
    /// `<prefix>/share/<name>`
    Share,
    /// `<prefix>/etc`
    Config,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DestinationKind::Executable => "executable",
            DestinationKind::Library => "library",
            DestinationKind::Include => "include",
            DestinationKind::Share => "share",
            DestinationKind::Config => "config",
        };
        f.write_str(s)
    }
}

/// One copy instruction: a file inside the extracted archive and its destination kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    source: PathBuf,
    kind: DestinationKind,
    rename: Option<String>,
}

impl InstallStep {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// File name at the destination: `rename` if given, else the source's file name.
    pub fn file_name(&self) -> &str {
        if let Some(r) = &self.rename {
            return r;
        }
        self.source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Fully resolved package descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    name: String,
    desc: Option<String>,
    homepage: Option<String>,
    version: String,
    url: String,
    archive_name: String,
    archive_format: ArchiveFormat,
    expected_checksum: Sha256Digest,
    install_steps: Vec<InstallStep>,
    test_command: Vec<String>,
}

impl Descriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// File name of the archive, taken from the last URL path segment.
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        self.archive_format
    }

    pub fn expected_checksum(&self) -> &Sha256Digest {
        &self.expected_checksum
    }

    pub fn install_steps(&self) -> &[InstallStep] {
        &self.install_steps
    }

    pub fn test_command(&self) -> &[String] {
        &self.test_command
    }
}

/// Inputs for resolving templated fields.
pub struct LoadContext<'a> {
    pub vars: &'a dyn VariableSource,
    pub platform: Platform,
    /// Base for `{{ sha256 "path" }}`; set to the descriptor's directory by [`Descriptor::load`].
    pub base_dir: PathBuf,
}

impl<'a> LoadContext<'a> {
    pub fn new(vars: &'a dyn VariableSource) -> Self {
        Self {
            vars,
            platform: Platform::detect(),
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    version: String,
    url: String,
    sha256: String,
    #[serde(default)]
    install: Vec<RawInstallStep>,
    test: RawTest,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstallStep {
    source: String,
    kind: DestinationKind,
    #[serde(default)]
    rename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    command: Vec<String>,
}

impl Descriptor {
    /// Read and resolve a descriptor file. `sha256 "path"` placeholders resolve
    /// relative to the file's directory.
    pub fn load(path: &Path, ctx: LoadContext<'_>) -> Result<Self, DescriptorError> {
        let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawDescriptor = toml::from_str(&text).map_err(|source| DescriptorError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::resolve(raw, &ctx.with_base_dir(base_dir))
    }

    /// Parse and resolve descriptor text.
    pub fn from_toml_str(text: &str, ctx: &LoadContext<'_>) -> Result<Self, DescriptorError> {
        let raw: RawDescriptor = toml::from_str(text).map_err(|source| DescriptorError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(raw, ctx)
    }

    fn resolve(raw: RawDescriptor, ctx: &LoadContext<'_>) -> Result<Self, DescriptorError> {
        let name = raw.name.trim().to_string();
        validate_name(&name)?;

        let render = |field: &str, value: &str, version: Option<&str>| {
            let tctx = TemplateContext {
                vars: ctx.vars,
                name: &name,
                version,
                platform: &ctx.platform,
                base_dir: &ctx.base_dir,
            };
            template::render(value, &tctx).map_err(|source| DescriptorError::Template {
                field: field.to_string(),
                source,
            })
        };

        let version = render("version", &raw.version, None)?.trim().to_string();
        if version.is_empty() {
            return Err(DescriptorError::invalid("version", "resolved to an empty string"));
        }
        // Versions become part of cache entry file names.
        validate_file_name(&version).map_err(|r| DescriptorError::invalid("version", r))?;
        let v = Some(version.as_str());

        let url = render("url", &raw.url, v)?.trim().to_string();
        let parsed = url_model::validate_url(&url).map_err(|r| DescriptorError::invalid("url", r))?;
        let archive_name = url_model::filename_from_url_path(parsed.as_str())
            .ok_or_else(|| DescriptorError::invalid("url", "has no file name in its path"))?;
        let archive_format = ArchiveFormat::from_file_name(&archive_name).ok_or_else(|| {
            DescriptorError::invalid(
                "url",
                format!("`{}` is not a .zip, .tar.gz, .tgz or .tar archive", archive_name),
            )
        })?;

        let sha256 = render("sha256", &raw.sha256, v)?;
        let expected_checksum: Sha256Digest = sha256
            .parse()
            .map_err(|e| DescriptorError::invalid("sha256", format!("{}", e)))?;

        let desc = raw
            .desc
            .as_deref()
            .map(|d| render("desc", d, v))
            .transpose()?;
        let homepage = raw
            .homepage
            .as_deref()
            .map(|h| render("homepage", h, v))
            .transpose()?;

        if raw.install.is_empty() {
            return Err(DescriptorError::invalid("install", "at least one step is required"));
        }
        let mut install_steps = Vec::with_capacity(raw.install.len());
        let mut seen = HashSet::new();
        for (i, step) in raw.install.iter().enumerate() {
            let field = format!("install[{}]", i);
            let source = render(&format!("{}.source", field), &step.source, v)?;
            let source = validate_relative(&source)
                .map_err(|r| DescriptorError::invalid(format!("{}.source", field), r))?;
            let rename = step
                .rename
                .as_deref()
                .map(|r| render(&format!("{}.rename", field), r, v))
                .transpose()?;
            if let Some(r) = &rename {
                validate_file_name(r)
                    .map_err(|reason| DescriptorError::invalid(format!("{}.rename", field), reason))?;
            }
            let step = InstallStep {
                source,
                kind: step.kind,
                rename,
            };
            if !seen.insert((step.kind, step.file_name().to_string())) {
                return Err(DescriptorError::invalid(
                    field,
                    format!("duplicate destination {} `{}`", step.kind, step.file_name()),
                ));
            }
            install_steps.push(step);
        }

        let test_command = raw
            .test
            .command
            .iter()
            .enumerate()
            .map(|(i, arg)| render(&format!("test.command[{}]", i), arg, v))
            .collect::<Result<Vec<_>, _>>()?;
        if test_command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(DescriptorError::invalid("test.command", "must name a program"));
        }

        Ok(Descriptor {
            name,
            desc,
            homepage,
            version,
            url,
            archive_name,
            archive_format,
            expected_checksum,
            install_steps,
            test_command,
        })
    }
}

fn validate_name(name: &str) -> Result<(), DescriptorError> {
    validate_file_name(name).map_err(|r| DescriptorError::invalid("name", r))
}

/// A single, non-special path component.
fn validate_file_name(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s == "." || s == ".." || s.contains('/') || s.contains('\\') {
        return Err(format!("`{}` must be a plain file name", s));
    }
    Ok(())
}

/// Relative path without `..`, root or prefix components.
fn validate_relative(s: &str) -> Result<PathBuf, String> {
    let path = Path::new(s.trim());
    if path.as_os_str().is_empty() {
        return Err("must not be empty".to_string());
    }
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("`{}` must stay inside the archive", s));
            }
        }
    }
    if out.file_name().is_none() {
        return Err(format!("`{}` does not name a file", s));
    }
    Ok(out)
}
