//! Builders for unit blobs, archive bundles, and development projects.
//!
//! These panic on I/O failure; they are meant for tests only.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use hearth_plugins::bundle::{ARCHIVE_EXTENSION, UNIT_EXTENSION};
use hearth_plugins::{DevLayoutSection, UnitDescriptor};

/// Builder for a unit descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec(UnitDescriptor);

impl UnitSpec {
    /// An open, concrete class.
    #[must_use]
    pub fn class() -> Self {
        Self(UnitDescriptor::class())
    }

    /// An abstract class.
    #[must_use]
    pub fn abstract_class() -> Self {
        let mut desc = UnitDescriptor::class();
        desc.is_abstract = true;
        Self(desc)
    }

    /// An interface.
    #[must_use]
    pub fn interface() -> Self {
        Self(UnitDescriptor::interface())
    }

    /// A final class implementing `capability`, built by `constructor`.
    #[must_use]
    pub fn extension(capability: &str, constructor: &str) -> Self {
        Self::class()
            .sealed()
            .implements(capability)
            .constructor(constructor)
    }

    /// Mark the unit final.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.0.is_final = true;
        self
    }

    /// Add a directly implemented (or extended) interface.
    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.0.interfaces.push(interface.to_owned());
        self
    }

    /// Add a linked unit.
    #[must_use]
    pub fn references(mut self, unit: &str) -> Self {
        self.0.references.push(unit.to_owned());
        self
    }

    /// Set the constructor symbol.
    #[must_use]
    pub fn constructor(mut self, symbol: &str) -> Self {
        self.0.constructor = Some(symbol.to_owned());
        self
    }

    /// The built descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &UnitDescriptor {
        &self.0
    }

    /// The descriptor encoded as a unit blob.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor cannot be serialized.
    #[must_use]
    pub fn blob(&self) -> Vec<u8> {
        self.0.to_blob("test unit").expect("serialize unit descriptor")
    }
}

/// Bundle path of unit `name`: `a.b.C` becomes `a/b/C.unit`.
#[must_use]
pub fn unit_path(name: &str) -> String {
    format!("{}{UNIT_EXTENSION}", name.replace('.', "/"))
}

/// In-memory `.tgz` bundle builder.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    /// An empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add unit `name`.
    #[must_use]
    pub fn unit(self, name: &str, spec: &UnitSpec) -> Self {
        self.file(&unit_path(name), spec.blob())
    }

    /// Add a resource (or any other entry) at `path`.
    #[must_use]
    pub fn file(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((path.to_owned(), bytes.into()));
        self
    }

    /// Add a `META-INF/MANIFEST.MF` entry.
    #[must_use]
    pub fn with_manifest(self) -> Self {
        self.file("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")
    }

    /// Encode the archive.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).expect("tar entry path");
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data.as_slice()).expect("tar append");
        }
        let tar_data = builder.into_inner().expect("tar finish");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&tar_data).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    /// Write the archive as `<dir>/<plugin>.tgz`, returning its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_to(&self, dir: &Path, plugin: &str) -> PathBuf {
        std::fs::create_dir_all(dir).expect("create archive dir");
        let path = dir.join(format!("{plugin}{ARCHIVE_EXTENSION}"));
        std::fs::write(&path, self.build()).expect("write archive");
        path
    }
}

/// Writes a development project's build output under a root directory.
#[derive(Debug, Clone)]
pub struct DevProjectBuilder {
    dir: PathBuf,
    layout: DevLayoutSection,
}

impl DevProjectBuilder {
    /// Project `project` under `root`, using the default layout.
    #[must_use]
    pub fn new(root: &Path, project: &str) -> Self {
        Self {
            dir: root.join(project),
            layout: DevLayoutSection::default(),
        }
    }

    /// Use `layout` instead of the default.
    #[must_use]
    pub fn with_layout(mut self, layout: DevLayoutSection) -> Self {
        self.layout = layout;
        self
    }

    /// The project directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write unit `name` into the first unit directory.
    ///
    /// # Panics
    ///
    /// Panics if the layout has no unit directory or the write fails.
    #[must_use]
    pub fn unit(self, name: &str, spec: &UnitSpec) -> Self {
        self.unit_in(0, name, spec)
    }

    /// Write unit `name` into unit directory `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the write fails.
    #[must_use]
    pub fn unit_in(self, index: usize, name: &str, spec: &UnitSpec) -> Self {
        let root = self.dir.join(&self.layout.unit_dirs[index]);
        write_file(&root.join(unit_path(name)), &spec.blob());
        self
    }

    /// Write a resource at `path` inside the resource directory.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    #[must_use]
    pub fn resource(self, path: &str, bytes: impl AsRef<[u8]>) -> Self {
        let root = self.dir.join(&self.layout.resource_dir);
        write_file(&root.join(path), bytes.as_ref());
        self
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write file");
}
