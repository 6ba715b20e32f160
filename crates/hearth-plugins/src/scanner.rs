//! Bundle discovery.
//!
//! Archives (`.tgz`) are found by walking the plugins directory; development
//! projects contribute their build output directly. Every directory listing
//! and every file read runs as its own task in a [`JoinSet`]; a scan returns
//! only after all of its tasks have finished. The first failure cancels the
//! scan's token, and blocking archive reads poll that token between chunks.

use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use flate2::read::GzDecoder;
use hearth_config::{DevLayoutSection, PluginsSection};
use tar::Archive;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bundle::{
    BundleContent, BundleOrigin, DiscoveredBundle, entry_name, is_archive, is_metadata,
    plugin_name_from_archive, plugin_name_from_project,
};
use crate::error::{PluginError, PluginResult};
use crate::plugin::PluginInstance;

/// Discovers bundles in the plugins directory and in development projects.
#[derive(Debug, Clone)]
pub struct BundleScanner {
    plugins_dir: PathBuf,
    dev_root: PathBuf,
    dev_projects: Vec<String>,
    layout: DevLayoutSection,
    max_entry_size: u64,
    cancel: CancellationToken,
}

impl BundleScanner {
    /// A scanner for archives under `plugins_dir`, with no dev projects.
    #[must_use]
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            dev_root: PathBuf::from("."),
            dev_projects: Vec::new(),
            layout: DevLayoutSection::default(),
            max_entry_size: hearth_config::DEFAULT_MAX_ENTRY_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// A scanner configured from the `[plugins]` section. Relative paths are
    /// resolved against `workspace_root`, which is also the dev project root.
    #[must_use]
    pub fn from_config(section: &PluginsSection, workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(&section.dir))
            .with_dev_root(workspace_root)
            .with_dev_projects(section.dev_projects.iter().cloned())
            .with_layout(section.dev_layout.clone())
            .with_max_entry_size(section.max_entry_size)
    }

    /// Directory holding development projects.
    #[must_use]
    pub fn with_dev_root(mut self, dev_root: impl Into<PathBuf>) -> Self {
        self.dev_root = dev_root.into();
        self
    }

    /// Development projects to load, in order.
    #[must_use]
    pub fn with_dev_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dev_projects = projects.into_iter().map(Into::into).collect();
        self
    }

    /// Build-output layout shared by all development projects.
    #[must_use]
    pub fn with_layout(mut self, layout: DevLayoutSection) -> Self {
        self.layout = layout;
        self
    }

    /// Largest entry (or dev file) the scanner will read, in bytes.
    #[must_use]
    pub fn with_max_entry_size(mut self, max_entry_size: u64) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// Token that cancels every task of a running scan.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The archive directory.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Scan the plugins directory and every dev project.
    ///
    /// `prepare` runs after the plugins directory is known to exist and
    /// before anything is scanned, so the host can install standard bundles.
    /// Archive bundles come first, sorted by path, then dev projects in
    /// configured order.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidPluginsDir`] before scanning if the
    /// plugins directory is unusable, and any scan error otherwise.
    pub async fn scan<F>(&self, prepare: F) -> PluginResult<Vec<DiscoveredBundle>>
    where
        F: FnOnce(&Path) -> PluginResult<()>,
    {
        self.ensure_plugins_dir().await?;
        prepare(&self.plugins_dir)?;

        let mut bundles = self.scan_archive_dir(&self.plugins_dir).await?;
        for project in &self.dev_projects {
            bundles.push(self.scan_dev_project(project).await?);
        }
        info!(
            plugins_dir = %self.plugins_dir.display(),
            bundles = bundles.len(),
            "Bundle scan complete"
        );
        Ok(bundles)
    }

    /// [`scan`](Self::scan) with no preparation step.
    ///
    /// # Errors
    ///
    /// See [`scan`](Self::scan).
    pub async fn scan_default_locations(&self) -> PluginResult<Vec<DiscoveredBundle>> {
        self.scan(|_| Ok(())).await
    }

    async fn ensure_plugins_dir(&self) -> PluginResult<()> {
        let invalid = |message: String| PluginError::InvalidPluginsDir {
            path: self.plugins_dir.clone(),
            message,
        };
        match tokio::fs::metadata(&self.plugins_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(invalid("exists but is not a directory".to_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.plugins_dir)
                    .await
                    .map_err(|e| invalid(format!("cannot create: {e}")))?;
                info!(path = %self.plugins_dir.display(), "Created plugins directory");
                Ok(())
            },
            Err(e) => Err(invalid(e.to_string())),
        }
    }

    /// Read every archive under `dir`, recursively. One bundle per archive,
    /// sorted by archive path.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable directory or archive, on an oversized
    /// entry, or on cancellation.
    pub async fn scan_archive_dir(&self, dir: &Path) -> PluginResult<Vec<DiscoveredBundle>> {
        let found: ArchiveSink = Arc::default();
        let max_entry_size = self.max_entry_size;

        let scan = self.cancel.child_token();
        let sink = Arc::clone(&found);
        let cancel = scan.clone();
        Self::fan_out(&scan, vec![ArchiveJob::Dir(dir.to_path_buf())], move |job| {
            let sink = Arc::clone(&sink);
            let cancel = cancel.clone();
            async move {
                match job {
                    ArchiveJob::Dir(dir) => list_archive_dir(dir).await,
                    ArchiveJob::Archive(path) => {
                        read_archive_job(path, max_entry_size, cancel, sink).await
                    },
                }
            }
        })
        .await?;

        let mut archives =
            std::mem::take(&mut *found.lock().unwrap_or_else(PoisonError::into_inner));
        archives.sort_by(|a, b| a.0.cmp(&b.0));

        let mut bundles = Vec::with_capacity(archives.len());
        for (path, content) in archives {
            let name = plugin_name_from_archive(&path).ok_or_else(|| PluginError::ArchiveError {
                path: path.display().to_string(),
                message: "not an archive bundle".to_owned(),
            })?;
            bundles.push(DiscoveredBundle {
                content,
                plugin: Arc::new(PluginInstance::new(name)),
                origin: BundleOrigin::Archive(path),
            });
        }
        Ok(bundles)
    }

    /// Load development project `project` from `<dev_root>/<project>`.
    ///
    /// # Errors
    ///
    /// See [`scan_unit_dirs`](Self::scan_unit_dirs).
    pub async fn scan_dev_project(&self, project: &str) -> PluginResult<DiscoveredBundle> {
        let dir = self.dev_root.join(project);
        let roots: Vec<PathBuf> = self.layout.roots().iter().map(|r| dir.join(r)).collect();
        let content = self.scan_unit_dirs(&roots).await?;
        let name = plugin_name_from_project(project);
        debug!(
            project,
            plugin = name,
            units = content.units.len(),
            resources = content.resources.len(),
            "Read development bundle"
        );
        Ok(DiscoveredBundle {
            content,
            plugin: Arc::new(PluginInstance::new(name)),
            origin: BundleOrigin::DevProject {
                name: project.to_owned(),
                dir,
            },
        })
    }

    /// Read every file under each of `roots` into one bundle. Paths are
    /// taken relative to their root.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotADirectory`] for a root that exists but is
    /// not a directory. Missing roots contribute nothing.
    pub async fn scan_unit_dirs(&self, roots: &[PathBuf]) -> PluginResult<BundleContent> {
        let mut jobs = Vec::new();
        for root in roots {
            match tokio::fs::metadata(root).await {
                Ok(meta) if meta.is_dir() => jobs.push(TreeJob::Dir {
                    root: Arc::from(root.as_path()),
                    dir: root.clone(),
                }),
                Ok(_) => return Err(PluginError::NotADirectory { path: root.clone() }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(root = %root.display(), "Build root missing, skipping");
                },
                Err(e) => return Err(PluginError::io(root)(e)),
            }
        }

        let content: Arc<Mutex<BundleContent>> = Arc::default();
        let max_entry_size = self.max_entry_size;
        let scan = self.cancel.child_token();
        let sink = Arc::clone(&content);
        Self::fan_out(&scan, jobs, move |job| {
            let sink = Arc::clone(&sink);
            async move {
                match job {
                    TreeJob::Dir { root, dir } => list_tree_dir(root, dir).await,
                    TreeJob::File { root, path } => {
                        read_tree_job(root, path, max_entry_size, sink).await
                    },
                }
            }
        })
        .await?;

        Ok(std::mem::take(
            &mut *content.lock().unwrap_or_else(PoisonError::into_inner),
        ))
    }

    /// Run `run` on every job, spawning the child jobs each one returns,
    /// until none remain. The first error cancels `cancel`; every task still
    /// running is then joined, not aborted, so none outlives the scan.
    async fn fan_out<J, F, Fut>(
        cancel: &CancellationToken,
        roots: Vec<J>,
        run: F,
    ) -> PluginResult<()>
    where
        J: Send + 'static,
        F: Fn(J) -> Fut,
        Fut: Future<Output = PluginResult<Vec<J>>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for job in roots {
            tasks.spawn(cancellable(cancel.clone(), run(job)));
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(PluginError::TaskFailed(e.to_string())));
            match outcome {
                Ok(children) if failure.is_none() => {
                    for child in children {
                        tasks.spawn(cancellable(cancel.clone(), run(child)));
                    }
                },
                Ok(_) => {},
                Err(e) => {
                    if failure.is_none() {
                        cancel.cancel();
                        failure = Some(e);
                    }
                },
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(PluginError::ScanCancelled);
        }
        Ok(())
    }
}

/// Archives read so far, with their paths.
type ArchiveSink = Arc<Mutex<Vec<(PathBuf, BundleContent)>>>;

enum ArchiveJob {
    Dir(PathBuf),
    Archive(PathBuf),
}

enum TreeJob {
    Dir { root: Arc<Path>, dir: PathBuf },
    File { root: Arc<Path>, path: PathBuf },
}

/// Run `job` unless the scan is already cancelled. A started job always runs
/// to completion; long reads check the token themselves.
async fn cancellable<T>(
    cancel: CancellationToken,
    job: impl Future<Output = PluginResult<T>>,
) -> PluginResult<T> {
    if cancel.is_cancelled() {
        return Err(PluginError::ScanCancelled);
    }
    job.await
}

async fn list_archive_dir(dir: PathBuf) -> PluginResult<Vec<ArchiveJob>> {
    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(PluginError::io(&dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(PluginError::io(&dir))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(PluginError::io(&path))?;
        if file_type.is_dir() {
            children.push(ArchiveJob::Dir(path));
        } else if file_type.is_file() && is_archive(&path) {
            children.push(ArchiveJob::Archive(path));
        }
    }
    Ok(children)
}

async fn read_archive_job(
    path: PathBuf,
    max_entry_size: u64,
    cancel: CancellationToken,
    sink: ArchiveSink,
) -> PluginResult<Vec<ArchiveJob>> {
    let read_path = path.clone();
    let content = tokio::task::spawn_blocking(move || {
        read_archive_file(&read_path, max_entry_size, &cancel)
    })
    .await
    .map_err(|e| PluginError::TaskFailed(e.to_string()))??;
    debug!(
        archive = %path.display(),
        units = content.units.len(),
        resources = content.resources.len(),
        "Read archive bundle"
    );
    sink.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((path, content));
    Ok(Vec::new())
}

async fn list_tree_dir(root: Arc<Path>, dir: PathBuf) -> PluginResult<Vec<TreeJob>> {
    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(PluginError::io(&dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(PluginError::io(&dir))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(PluginError::io(&path))?;
        let root = Arc::clone(&root);
        if file_type.is_dir() {
            children.push(TreeJob::Dir { root, dir: path });
        } else if file_type.is_file() {
            children.push(TreeJob::File { root, path });
        }
    }
    Ok(children)
}

async fn read_tree_job(
    root: Arc<Path>,
    path: PathBuf,
    max_entry_size: u64,
    sink: Arc<Mutex<BundleContent>>,
) -> PluginResult<Vec<TreeJob>> {
    let (name, bytes) = read_tree_file(&root, &path, max_entry_size).await?;
    sink.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert_entry(&name, bytes);
    Ok(Vec::new())
}

async fn read_tree_file(
    root: &Path,
    path: &Path,
    max_entry_size: u64,
) -> PluginResult<(String, Vec<u8>)> {
    let name = path
        .strip_prefix(root)
        .ok()
        .and_then(entry_name)
        .ok_or_else(|| PluginError::PathTraversal {
            path: path.display().to_string(),
        })?;
    let size = tokio::fs::metadata(path)
        .await
        .map_err(PluginError::io(path))?
        .len();
    if size > max_entry_size {
        return Err(PluginError::EntryTooLarge {
            path: name,
            size,
            limit: max_entry_size,
        });
    }
    let bytes = tokio::fs::read(path).await.map_err(PluginError::io(path))?;
    Ok((name, bytes))
}

fn read_archive_file(
    path: &Path,
    max_entry_size: u64,
    cancel: &CancellationToken,
) -> PluginResult<BundleContent> {
    let file = std::fs::File::open(path).map_err(PluginError::io(path))?;
    read_archive(std::io::BufReader::new(file), max_entry_size, cancel).map_err(|e| match e {
        PluginError::ArchiveError { message, .. } => PluginError::ArchiveError {
            path: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// Bytes read from an archive entry between cancellation checks.
const READ_CHUNK: usize = 64 * 1024;

/// Read a gzip-compressed tar stream into a bundle.
///
/// Entries under `META-INF/` (after path normalization) and directory
/// entries are skipped. `.unit` files become units under their dotted name;
/// other files become resources under their entry path.
///
/// # Errors
///
/// - [`PluginError::EntryTooLarge`] if an entry's size (PAX extensions
///   included) exceeds `max_entry_size` (nothing of it is read)
/// - [`PluginError::UnsafeEntryType`] for links, devices and FIFOs
/// - [`PluginError::PathTraversal`] for absolute or `..` paths
/// - [`PluginError::ArchiveError`] if the stream cannot be decoded
/// - [`PluginError::ScanCancelled`] if `cancel` fires, checked between
///   entries and between chunks of one entry
pub fn read_archive<R: Read>(
    reader: R,
    max_entry_size: u64,
    cancel: &CancellationToken,
) -> PluginResult<BundleContent> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut content = BundleContent::new();

    for entry in archive.entries().map_err(archive_err)? {
        if cancel.is_cancelled() {
            return Err(PluginError::ScanCancelled);
        }
        let mut entry = entry.map_err(archive_err)?;
        let raw_path = entry.path().map_err(archive_err)?.into_owned();
        let display = raw_path.display().to_string();
        let name = entry_name(&raw_path);

        if name.as_deref().is_some_and(is_metadata) {
            continue;
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory
            | tar::EntryType::XGlobalHeader
            | tar::EntryType::XHeader
            | tar::EntryType::GNULongName => continue,
            tar::EntryType::Regular | tar::EntryType::Continuous => {},
            other => {
                return Err(PluginError::UnsafeEntryType {
                    entry_type: format!("{other:?}"),
                    path: display,
                });
            },
        }

        let name = name.ok_or(PluginError::PathTraversal { path: display })?;

        let size = entry.size();
        if size > max_entry_size {
            return Err(PluginError::EntryTooLarge {
                path: name,
                size,
                limit: max_entry_size,
            });
        }

        let bytes = read_entry(&mut entry, cancel)?;
        content.insert_entry(&name, bytes);
    }

    Ok(content)
}

fn archive_err(e: std::io::Error) -> PluginError {
    PluginError::ArchiveError {
        path: "<stream>".to_owned(),
        message: e.to_string(),
    }
}

/// Copy one entry in [`READ_CHUNK`] pieces, stopping early on cancellation.
/// The buffer grows with what is actually read, not with the declared size.
fn read_entry(entry: &mut impl Read, cancel: &CancellationToken) -> PluginResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(PluginError::ScanCancelled);
        }
        match entry.read(&mut chunk) {
            Ok(0) => return Ok(bytes),
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => return Err(archive_err(e)),
        }
    }
}
