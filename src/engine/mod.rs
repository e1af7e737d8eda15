//! Ingestion engine: reconciles the catalog against a destination tree,
//! then copies unique files out of a source tree into date partitions.
//!
//! Both phases are idempotent. Catalog writes are wrapped in one
//! transaction per walker batch, so a crash loses at most the in-flight
//! batch and a re-run picks up cleanly.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::error::{IngestError, Result};
use crate::partition;
use crate::scanner;

/// Staged copies are written under this suffix and renamed into place only
/// once complete, so a crash never leaves a partial file under a final
/// name. Reconciliation ignores leftovers.
const PART_SUFFIX: &str = ".part";

/// Progress events for a presentation layer (CLI, TUI) to render. Sent
/// best-effort; a dropped receiver never stops the run.
#[derive(Debug, Clone)]
pub enum IngestProgress {
    ReconcileStarted,
    ReconcileCompleted { registered: usize, skipped: usize },
    /// Emitted once per distinct source directory, not per file.
    Scanning { directory: String },
    Copied { source: String, destination: String },
    Error { message: String },
    Completed { copied: usize, skipped: usize, failed: usize, cataloged: i64 },
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Files per source batch (one catalog transaction each).
    pub source_batch_size: usize,
    /// Files per reconciliation batch.
    pub reconcile_batch_size: usize,
    /// Collision suffixes to try before giving up on a file.
    pub collision_cap: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            source_batch_size: 500,
            reconcile_batch_size: 1000,
            collision_cap: 999,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileOutcome {
    /// Records backfilled for files already present at the destination.
    pub registered: usize,
    /// Physical duplicates found at the destination and left in place.
    pub skipped: usize,
    /// Files skipped over per-file errors.
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    /// Files copied and registered.
    pub copied: usize,
    /// Files whose content was already collected.
    pub skipped: usize,
    /// Files skipped over per-file errors.
    pub failed: usize,
}

pub struct Ingester {
    catalog: CatalogStore,
    options: EngineOptions,
}

impl Ingester {
    pub fn new(catalog: CatalogStore, options: EngineOptions) -> Self {
        Self { catalog, options }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    /// Backfill catalog records for files already physically present under
    /// `dest_root`. Without this, a first run against a non-empty
    /// destination would re-copy everything already there.
    pub fn reconcile(
        &self,
        dest_root: &Path,
        progress: Option<&mpsc::Sender<IngestProgress>>,
    ) -> Result<ReconcileOutcome> {
        info!(dest = %dest_root.display(), "reconciling catalog against destination");
        send(progress, IngestProgress::ReconcileStarted);

        let mut outcome = ReconcileOutcome::default();
        for batch in scanner::walk(dest_root, self.options.reconcile_batch_size) {
            self.catalog.begin_batch()?;
            for (directory, name) in &batch {
                if name.ends_with(PART_SUFFIX) {
                    // Leftover from an interrupted copy; a retry will
                    // overwrite it. Never promote it to a record.
                    continue;
                }
                let save_to = relative_partition(directory, dest_root);
                if !self.catalog.find_by_destination(&save_to, name)?.is_empty() {
                    continue;
                }

                let mut record = match scanner::extract(directory, name) {
                    Ok(record) => record,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(file = %directory.join(name).display(), error = %e, "skipping file");
                        send(progress, IngestProgress::Error { message: e.to_string() });
                        outcome.failed += 1;
                        continue;
                    }
                };

                if let Some(existing) = self.catalog.find_by_content(
                    record.size,
                    &record.hash,
                    record.captured_at.as_ref(),
                )? {
                    debug!(
                        existing = %existing.full_name().display(),
                        duplicate = %record.full_name().display(),
                        "content already cataloged, not collecting"
                    );
                    outcome.skipped += 1;
                    continue;
                }

                record.save_to = save_to;
                self.catalog.register(&record)?;
                outcome.registered += 1;
            }
            self.catalog.commit_batch()?;
        }

        info!(
            registered = outcome.registered,
            skipped = outcome.skipped,
            "reconciliation finished"
        );
        send(
            progress,
            IngestProgress::ReconcileCompleted {
                registered: outcome.registered,
                skipped: outcome.skipped,
            },
        );
        Ok(outcome)
    }

    /// Walk `src_root` and copy every not-yet-collected file into its
    /// partition under `dest_root`, registering each copy in the catalog.
    pub fn ingest(
        &self,
        src_root: &Path,
        dest_root: &Path,
        progress: Option<&mpsc::Sender<IngestProgress>>,
    ) -> Result<IngestOutcome> {
        info!(src = %src_root.display(), dest = %dest_root.display(), "collecting files");

        let mut outcome = IngestOutcome::default();
        let mut current_dir = None;
        let mut created_partitions: HashSet<String> = HashSet::new();

        for batch in scanner::walk(src_root, self.options.source_batch_size) {
            self.catalog.begin_batch()?;
            for (directory, name) in &batch {
                if current_dir.as_ref() != Some(directory) {
                    current_dir = Some(directory.clone());
                    info!(directory = %directory.display(), "collecting files from directory");
                    send(
                        progress,
                        IngestProgress::Scanning {
                            directory: directory.to_string_lossy().to_string(),
                        },
                    );
                }

                match self.ingest_file(directory, name, dest_root, &mut created_partitions) {
                    Ok(Some(destination)) => {
                        outcome.copied += 1;
                        send(
                            progress,
                            IngestProgress::Copied {
                                source: directory.join(name).to_string_lossy().to_string(),
                                destination,
                            },
                        );
                    }
                    Ok(None) => outcome.skipped += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(file = %directory.join(name).display(), error = %e, "skipping file");
                        send(progress, IngestProgress::Error { message: e.to_string() });
                        outcome.failed += 1;
                    }
                }
            }
            self.catalog.commit_batch()?;
        }

        let cataloged = self.catalog.count()?;
        info!(
            copied = outcome.copied,
            skipped = outcome.skipped,
            failed = outcome.failed,
            cataloged,
            "collection finished"
        );
        send(
            progress,
            IngestProgress::Completed {
                copied: outcome.copied,
                skipped: outcome.skipped,
                failed: outcome.failed,
                cataloged,
            },
        );
        Ok(outcome)
    }

    /// Copy-or-skip one source file. Returns the destination path when a
    /// copy was made, `None` when the content was already collected.
    fn ingest_file(
        &self,
        directory: &Path,
        name: &str,
        dest_root: &Path,
        created_partitions: &mut HashSet<String>,
    ) -> Result<Option<String>> {
        let mut record = scanner::extract(directory, name)?;

        if let Some(existing) =
            self.catalog
                .find_by_content(record.size, &record.hash, record.captured_at.as_ref())?
        {
            debug!(
                existing = %existing.full_name().display(),
                duplicate = %record.full_name().display(),
                "content already collected, not copying"
            );
            return Ok(None);
        }

        let save_to = partition::partition_for(&record);
        let partition_dir = dest_root.join(&save_to);
        if !created_partitions.contains(&save_to) {
            fs::create_dir_all(&partition_dir)?;
            created_partitions.insert(save_to.clone());
        }

        let final_name = self.resolve_collision(&save_to, name)?;
        let destination = partition_dir.join(&final_name);
        let source = directory.join(name);
        staged_copy(&source, &destination)?;

        record.name = final_name;
        record.save_to = save_to;
        self.catalog.register(&record)?;

        debug!(src = %source.display(), dest = %destination.display(), "file collected");
        Ok(Some(destination.to_string_lossy().to_string()))
    }

    /// Probe the catalog for a free destination name, appending `_NN`
    /// before the extension until one is found. Bounded by actual
    /// collisions, with a cap against pathological same-named floods.
    fn resolve_collision(&self, save_to: &str, name: &str) -> Result<String> {
        let mut candidate = name.to_string();
        let mut count = 0u32;
        while !self.catalog.find_by_destination(save_to, &candidate)?.is_empty() {
            count += 1;
            if count > self.options.collision_cap {
                return Err(IngestError::CollisionExhausted {
                    save_to: save_to.to_string(),
                    name: name.to_string(),
                    attempts: count,
                });
            }
            candidate = numbered_name(name, count);
        }
        Ok(candidate)
    }
}

/// `photo.jpg` -> `photo_01.jpg`, `photo_02.jpg`, ...
fn numbered_name(name: &str, count: u32) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    match path.extension() {
        Some(ext) => format!("{}_{:02}.{}", stem, count, ext.to_string_lossy()),
        None => format!("{}_{:02}", stem, count),
    }
}

/// Copy via a `.part` staging name, carry the source mtime over, then
/// rename into place. Registration happens only after this succeeds.
fn staged_copy(source: &Path, destination: &Path) -> Result<()> {
    let mtime = fs::metadata(source)?.modified()?;
    let staged = destination.with_file_name(format!(
        "{}{}",
        destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        PART_SUFFIX
    ));

    fs::copy(source, &staged)?;
    let staged_file = fs::File::options().write(true).open(&staged)?;
    staged_file.set_modified(mtime)?;
    drop(staged_file);
    fs::rename(&staged, destination)?;
    Ok(())
}

/// Destination-relative partition string for reconciliation, with `/`
/// separators regardless of platform. Files sitting directly in the
/// destination root get the `"."` partition so `save_to` is never empty.
fn relative_partition(directory: &Path, dest_root: &Path) -> String {
    let partition = directory
        .strip_prefix(dest_root)
        .unwrap_or(directory)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if partition.is_empty() {
        ".".to_string()
    } else {
        partition
    }
}

fn send(progress: Option<&mpsc::Sender<IngestProgress>>, event: IngestProgress) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    fn write_file(dir: &Path, name: &str, contents: &[u8]) {
        fs::create_dir_all(dir).unwrap();
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents).unwrap();
    }

    fn new_ingester(dir: &TempDir) -> Ingester {
        let catalog = CatalogStore::open(&dir.path().join("catalog.db")).unwrap();
        Ingester::new(catalog, EngineOptions::default())
    }

    /// All regular files under `root`, any depth.
    fn files_under(root: &Path) -> Vec<String> {
        scanner::walk(root, 10_000)
            .flatten()
            .map(|(_, name)| name)
            .collect()
    }

    #[test]
    fn test_identical_files_yield_one_copy_and_one_record() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&src.path().join("a"), "photo.txt", b"same bytes");
        write_file(&src.path().join("b"), "other.txt", b"same bytes");

        let ingester = new_ingester(&state);
        let outcome = ingester.ingest(src.path(), dest.path(), None).unwrap();

        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(ingester.catalog().count().unwrap(), 1);
        assert_eq!(files_under(dest.path()).len(), 1);
    }

    #[test]
    fn test_distinct_same_named_files_get_numbered_suffixes() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&src.path().join("a"), "photo.txt", b"first");
        write_file(&src.path().join("b"), "photo.txt", b"second");
        write_file(&src.path().join("c"), "photo.txt", b"third");

        let ingester = new_ingester(&state);
        let outcome = ingester.ingest(src.path(), dest.path(), None).unwrap();

        assert_eq!(outcome.copied, 3);
        let mut names = files_under(dest.path());
        names.sort();
        assert_eq!(names, vec!["photo.txt", "photo_01.txt", "photo_02.txt"]);
    }

    #[test]
    fn test_rerun_is_a_noop() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(src.path(), "one.txt", b"one");
        write_file(src.path(), "two.txt", b"two");

        let ingester = new_ingester(&state);
        let first = ingester.ingest(src.path(), dest.path(), None).unwrap();
        assert_eq!(first.copied, 2);

        let second = ingester.ingest(src.path(), dest.path(), None).unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(ingester.catalog().count().unwrap(), 2);
        assert_eq!(files_under(dest.path()).len(), 2);
    }

    #[test]
    fn test_reconcile_backfills_existing_destination() {
        let state = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&dest.path().join("2020/01"), "a.txt", b"aaa");
        write_file(&dest.path().join("2020/02"), "b.txt", b"bbb");
        write_file(&dest.path().join("2021/07"), "c.txt", b"ccc");

        let ingester = new_ingester(&state);
        let outcome = ingester.reconcile(dest.path(), None).unwrap();

        assert_eq!(outcome.registered, 3);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(ingester.catalog().count().unwrap(), 3);
        // Partitions come from the existing layout, not the date policy.
        let found = ingester.catalog().find_by_destination("2020/01", "a.txt").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_reconcile_is_idempotent_and_skips_duplicates() {
        let state = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&dest.path().join("2020/01"), "a.txt", b"aaa");
        // Physically duplicated content elsewhere in the tree.
        write_file(&dest.path().join("2020/02"), "a-again.txt", b"aaa");

        let ingester = new_ingester(&state);
        let first = ingester.reconcile(dest.path(), None).unwrap();
        assert_eq!(first.registered, 1);
        assert_eq!(first.skipped, 1);

        let second = ingester.reconcile(dest.path(), None).unwrap();
        assert_eq!(second.registered, 0);
        assert_eq!(ingester.catalog().count().unwrap(), 1);
    }

    #[test]
    fn test_reconcile_root_level_files_get_dot_partition() {
        let state = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(dest.path(), "loose.txt", b"xxx");

        let ingester = new_ingester(&state);
        let first = ingester.reconcile(dest.path(), None).unwrap();
        assert_eq!(first.registered, 1);

        let found = ingester.catalog().find_by_destination(".", "loose.txt").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].save_to, ".");

        // The sentinel is stable, so a re-run still recognizes the record.
        let second = ingester.reconcile(dest.path(), None).unwrap();
        assert_eq!(second.registered, 0);
    }

    #[test]
    fn test_reconcile_ignores_staged_part_files() {
        let state = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&dest.path().join("2020/01"), "a.txt.part", b"partial");

        let ingester = new_ingester(&state);
        let outcome = ingester.reconcile(dest.path(), None).unwrap();
        assert_eq!(outcome.registered, 0);
        assert_eq!(ingester.catalog().count().unwrap(), 0);
    }

    #[test]
    fn test_reconcile_then_ingest_does_not_recopy() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(src.path(), "a.txt", b"shared content");
        write_file(&dest.path().join("2019/04"), "a.txt", b"shared content");

        let ingester = new_ingester(&state);
        ingester.reconcile(dest.path(), None).unwrap();
        let outcome = ingester.ingest(src.path(), dest.path(), None).unwrap();

        assert_eq!(outcome.copied, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(files_under(dest.path()).len(), 1);
    }

    #[test]
    fn test_copies_land_in_partition_directories() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(src.path(), "a.txt", b"aaa");

        let ingester = new_ingester(&state);
        ingester.ingest(src.path(), dest.path(), None).unwrap();

        let record = scanner::extract(src.path(), "a.txt").unwrap();
        let expected = dest
            .path()
            .join(partition::partition_for(&record))
            .join("a.txt");
        assert!(expected.is_file());
        // No stray staging files left behind.
        assert!(!files_under(dest.path()).iter().any(|n| n.ends_with(PART_SUFFIX)));
    }

    #[test]
    fn test_copy_preserves_modification_time() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(src.path(), "a.txt", b"aaa");

        let ingester = new_ingester(&state);
        ingester.ingest(src.path(), dest.path(), None).unwrap();

        let record = scanner::extract(src.path(), "a.txt").unwrap();
        let copied = dest
            .path()
            .join(partition::partition_for(&record))
            .join("a.txt");
        let src_mtime = fs::metadata(src.path().join("a.txt")).unwrap().modified().unwrap();
        let dst_mtime = fs::metadata(&copied).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn test_progress_reports_once_per_directory() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&src.path().join("a"), "one.txt", b"1");
        write_file(&src.path().join("a"), "two.txt", b"2");
        write_file(&src.path().join("b"), "three.txt", b"3");

        let (tx, rx) = mpsc::channel();
        let ingester = new_ingester(&state);
        ingester.ingest(src.path(), dest.path(), Some(&tx)).unwrap();
        drop(tx);

        let scanning = rx
            .iter()
            .filter(|e| matches!(e, IngestProgress::Scanning { .. }))
            .count();
        assert_eq!(scanning, 2);
    }

    #[test]
    fn test_numbered_name_variants() {
        assert_eq!(numbered_name("photo.jpg", 1), "photo_01.jpg");
        assert_eq!(numbered_name("photo.jpg", 12), "photo_12.jpg");
        assert_eq!(numbered_name("archive.tar", 3), "archive_03.tar");
        assert_eq!(numbered_name("noext", 1), "noext_01");
    }

    #[test]
    fn test_collision_cap_fails_that_file_only() {
        let state = tempdir().unwrap();
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_file(&src.path().join("a"), "photo.txt", b"first");
        write_file(&src.path().join("b"), "photo.txt", b"second");

        let catalog = CatalogStore::open(&state.path().join("catalog.db")).unwrap();
        let ingester = Ingester::new(
            catalog,
            EngineOptions {
                collision_cap: 0,
                ..EngineOptions::default()
            },
        );
        let outcome = ingester.ingest(src.path(), dest.path(), None).unwrap();

        // The first copy needs no suffix; the second exhausts the cap
        // immediately but the run keeps going.
        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.failed, 1);
    }
}
