//! Async orchestration of armor, unarmor and inspect runs.
//!
//! The codec itself is synchronous. Armoring splits the work in two: an async
//! producer streams the input file into a bounded [`pipe`], and a blocking
//! consumer runs the [`GroupAssembler`] over the other end. Unarmoring and
//! inspection read the file directly on a blocking task.
//!
//! All output is staged in a temporary file next to its destination. An
//! error, or Ctrl-C, drops the temporary file and leaves the destination
//! untouched. Ctrl-C also cancels the blocking task through its [`cancel`]
//! guarded source.

use std::future::Future;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::armor::assembler::GroupAssembler;
use crate::armor::reconstructor::Reconstructor;
use crate::config::{ArmorConfig, PIPE_CAPACITY, PIPE_CHUNK_SIZE};
use crate::file::{self, File, OutputTarget};
use crate::types::{DecodeReport, EncodeReport, GroupOutcome, Processing};
use crate::ui::progress::Bar;
use crate::worker::cancel::Cancel;
use crate::worker::hasher::HashingWriter;
use crate::worker::pipe::PipeWriter;

pub mod cancel;
pub mod hasher;
pub mod pipe;

/// Where an armor run ended up.
#[derive(Debug)]
pub struct Armored {
    pub path: PathBuf,
    pub digest: String,
    pub report: EncodeReport,
    pub pruned: Vec<PathBuf>,
}

/// Health of one group as seen by [`Worker::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHealth {
    /// `None` when the group header was unreadable.
    pub sequence: Option<u64>,
    pub bytes: u64,
    /// Why the group was lost, if it was.
    pub problem: Option<String>,
}

/// Runs codec operations against files.
pub struct Worker {
    config: ArmorConfig,
    /// Draw progress bars.
    progress: bool,
}

impl Worker {
    pub fn new(config: ArmorConfig, progress: bool) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, progress })
    }

    /// Armors `input` into `target`, then prunes old archives when `leave` is set.
    pub async fn armor(&self, input: &File, target: &OutputTarget, force: bool, leave: Option<usize>) -> Result<Armored> {
        let size = input.size().await?;
        let source = input.open().await?;
        let bar = self.bar(size, Processing::Armor)?;

        tokio::fs::create_dir_all(&target.dir).await.with_context(|| format!("failed to create {}", target.dir.display()))?;
        let staged = file::staging_file(&target.dir)?;

        let (writer, reader) = pipe::bounded(PIPE_CAPACITY);
        let cancel = Cancel::default();
        let mut guarded = cancel.guard(reader);
        let config = self.config;
        let consumer = tokio::task::spawn_blocking(move || -> Result<(NamedTempFile, String, EncodeReport)> {
            let mut assembler = GroupAssembler::new(HashingWriter::new(BufWriter::new(staged)), config)?;
            let report = assembler.encode(&mut guarded)?;
            let (sink, digest) = assembler.finish()?.finalize();
            let staged = sink.into_inner().map_err(io::IntoInnerError::into_error)?;
            staged.as_file().sync_all()?;
            Ok((staged, digest, report))
        });

        let work = async {
            let fed = feed(source, writer, &bar).await;
            // The consumer's error explains a producer that hit a closed pipe.
            let (staged, digest, report) = consumer.await.context("armor worker panicked")??;
            let fed = fed?;
            if fed != report.input_bytes {
                bail!("input changed while armoring: read {fed} bytes, encoded {}", report.input_bytes);
            }
            Ok::<_, anyhow::Error>((staged, digest, report))
        };

        let (staged, digest, report) = interruptible(work, &bar, &cancel).await?;
        bar.finish();

        let path = target.render(&digest, Local::now().date_naive());
        file::persist(staged, &path, force)?;
        info!(path = %path.display(), groups = report.groups, bytes = report.output_bytes, "armored");

        let pruned = match leave {
            Some(keep) => file::prune(&target.dir, &target.template, keep)?,
            None => Vec::new(),
        };

        Ok(Armored { path, digest, report, pruned })
    }

    /// Recovers the payload of `input` into `output`.
    ///
    /// An incomplete decode is an error unless `allow_partial` is set, in which
    /// case whatever was recovered is kept.
    pub async fn unarmor(&self, input: &File, output: &Path, force: bool, allow_partial: bool) -> Result<DecodeReport> {
        let size = input.size().await?;
        let source = input.open_blocking()?;
        let bar = self.bar(size, Processing::Unarmor)?;

        let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let staged = file::staging_file(dir)?;

        let cancel = Cancel::default();
        let source = cancel.guard(bar.wrap_read(source));
        let config = self.config;
        let consumer = tokio::task::spawn_blocking(move || -> Result<(NamedTempFile, DecodeReport)> {
            let mut reconstructor = Reconstructor::new(source, config)?;
            let mut sink = BufWriter::new(staged);
            let report = reconstructor.decode_to(&mut sink)?;
            let staged = sink.into_inner().map_err(io::IntoInnerError::into_error)?;
            staged.as_file().sync_all()?;
            Ok((staged, report))
        });

        let (staged, report) = interruptible(async { consumer.await.context("unarmor worker panicked").and_then(|result| result) }, &bar, &cancel).await?;
        bar.finish();

        let report = if allow_partial {
            if !report.is_complete() {
                warn!(%report, "keeping partial recovery");
            }
            report
        } else {
            report.ensure_complete().with_context(|| format!("{} is damaged beyond repair (use --allow-partial to keep what was recovered)", input.path().display()))?
        };

        file::persist(staged, output, force)?;
        Ok(report)
    }

    /// Decodes `input` without writing anything and reports per-group health.
    pub async fn inspect(&self, input: &File) -> Result<(Vec<GroupHealth>, DecodeReport)> {
        let size = input.size().await?;
        let source = input.open_blocking()?;
        let bar = self.bar(size, Processing::Inspect)?;

        let cancel = Cancel::default();
        let source = cancel.guard(bar.wrap_read(source));
        let config = self.config;
        let consumer = tokio::task::spawn_blocking(move || -> Result<(Vec<GroupHealth>, DecodeReport)> {
            let mut groups = Vec::new();
            let mut reconstructor = Reconstructor::new(source, config)?;
            let report = reconstructor.decode_with(|outcome| {
                groups.push(GroupHealth::from(outcome));
                Ok(())
            })?;
            Ok((groups, report))
        });

        let inspected = interruptible(async { consumer.await.context("inspect worker panicked").and_then(|result| result) }, &bar, &cancel).await?;
        bar.finish();
        Ok(inspected)
    }

    fn bar(&self, total: u64, processing: Processing) -> Result<Bar> {
        if self.progress { Bar::new(total, processing) } else { Ok(Bar::hidden()) }
    }
}

impl From<&GroupOutcome> for GroupHealth {
    fn from(outcome: &GroupOutcome) -> Self {
        match outcome {
            GroupOutcome::Recovered { sequence, data } => Self { sequence: Some(*sequence), bytes: data.len() as u64, problem: None },
            GroupOutcome::Unrecoverable { sequence, reason } => Self { sequence: *sequence, bytes: 0, problem: Some(reason.to_string()) },
        }
    }
}

/// Streams `source` into the pipe in fixed-size chunks. Returns the bytes sent.
async fn feed(mut source: tokio::fs::File, writer: PipeWriter, bar: &Bar) -> Result<u64> {
    let mut total = 0u64;

    loop {
        let mut chunk = vec![0u8; PIPE_CHUNK_SIZE];
        let n = source.read(&mut chunk).await.context("failed to read input")?;
        if n == 0 {
            break;
        }

        chunk.truncate(n);
        writer.send_async(chunk).await.context("armor worker stopped")?;
        bar.add(n as u64);
        total += n as u64;
    }

    Ok(total)
}

/// Runs `work` unless Ctrl-C arrives first.
async fn interruptible<T>(work: impl Future<Output = Result<T>>, bar: &Bar, cancel: &Cancel) -> Result<T> {
    until(work, tokio::signal::ctrl_c(), bar, cancel).await
}

/// Runs `work` unless `stop` resolves first, in which case the blocking side is cancelled.
async fn until<T>(work: impl Future<Output = Result<T>>, stop: impl Future<Output = io::Result<()>>, bar: &Bar, cancel: &Cancel) -> Result<T> {
    tokio::select! {
        result = work => {
            if result.is_err() {
                bar.abandon("Failed");
            }
            result
        }
        Ok(()) = stop => {
            cancel.cancel();
            bar.abandon("Interrupted");
            bail!("interrupted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::DEFAULT_OUTPUT_TEMPLATE;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    fn worker() -> Worker {
        Worker::new(ArmorConfig::default(), false).unwrap()
    }

    #[tokio::test]
    async fn test_armor_then_unarmor() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("payload.bin");
        let data = sample(200_000);
        fs::write(&input, &data).unwrap();

        let target = OutputTarget::resolve(dir.path().join("out/").to_str(), &input);
        let armored = worker().armor(&File::new(&input), &target, false, None).await.unwrap();
        assert!(armored.path.exists());
        assert!(armored.path.to_string_lossy().ends_with(&format!("{}.armor", armored.digest)));
        assert_eq!(armored.report.input_bytes, data.len() as u64);
        assert_eq!(fs::metadata(&armored.path).unwrap().len(), armored.report.output_bytes);

        let restored = dir.path().join("restored.bin");
        let report = worker().unarmor(&File::new(&armored.path), &restored, false, false).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(fs::read(&restored).unwrap(), data);
    }

    #[tokio::test]
    async fn test_armor_digest_is_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::write(&input, sample(3000)).unwrap();

        let target = OutputTarget::resolve(dir.path().join("fixed.armor").to_str(), &input);
        let armored = worker().armor(&File::new(&input), &target, false, None).await.unwrap();
        assert_eq!(armored.path, dir.path().join("fixed.armor"));
        assert_eq!(armored.digest, blake3::hash(&fs::read(&armored.path).unwrap()).to_hex().as_str());
    }

    #[tokio::test]
    async fn test_armor_refuses_existing_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::write(&input, b"data").unwrap();
        let out = dir.path().join("taken.armor");
        fs::write(&out, b"precious").unwrap();

        let target = OutputTarget::resolve(out.to_str(), &input);
        assert!(worker().armor(&File::new(&input), &target, false, None).await.is_err());
        assert_eq!(fs::read(&out).unwrap(), b"precious");

        worker().armor(&File::new(&input), &target, true, None).await.unwrap();
        assert_ne!(fs::read(&out).unwrap(), b"precious");
    }

    #[tokio::test]
    async fn test_armor_leave_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("archives");
        fs::create_dir(&out).unwrap();
        for name in ["2020-01-01-aa.armor", "2020-01-02-bb.armor"] {
            fs::write(out.join(name), b"old").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(15));
        }

        let input = dir.path().join("in");
        fs::write(&input, sample(1000)).unwrap();
        let target = OutputTarget::resolve(out.to_str(), &input);
        assert_eq!(target.template, DEFAULT_OUTPUT_TEMPLATE);

        let armored = worker().armor(&File::new(&input), &target, false, Some(1)).await.unwrap();
        assert_eq!(armored.pruned.len(), 2);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
        assert!(armored.path.exists());
    }

    #[tokio::test]
    async fn test_unarmor_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("junk.armor");
        fs::write(&input, sample(4000)).unwrap();
        let output = dir.path().join("junk");

        assert!(worker().unarmor(&File::new(&input), &output, false, false).await.is_err());
        assert!(!output.exists());

        let report = worker().unarmor(&File::new(&input), &output, false, true).await.unwrap();
        assert!(!report.boundary_seen);
        assert_eq!(fs::metadata(&output).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_inspect_lists_groups() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::write(&input, sample(5000)).unwrap();
        let target = OutputTarget::resolve(dir.path().join("x.armor").to_str(), &input);
        let armored = worker().armor(&File::new(&input), &target, false, None).await.unwrap();

        let (groups, report) = worker().inspect(&File::new(&armored.path)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(groups.iter().map(|g| g.sequence).collect::<Vec<_>>(), vec![Some(0), Some(1), Some(2)]);
        assert_eq!(groups.iter().map(|g| g.bytes).sum::<u64>(), 5000);
        assert!(groups.iter().all(|g| g.problem.is_none()));
    }

    /// Hands out a few bytes per read, slowly.
    struct Trickle(io::Cursor<Vec<u8>>);

    impl io::Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            let len = buf.len().min(64);
            io::Read::read(&mut self.0, &mut buf[..len])
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_blocking_decode() {
        let config = ArmorConfig::default();
        let mut assembler = GroupAssembler::new(Vec::new(), config).unwrap();
        assembler.encode(&mut io::Cursor::new(sample(300_000))).unwrap();
        let wire = assembler.finish().unwrap();

        let cancel = Cancel::default();
        let source = cancel.guard(Trickle(io::Cursor::new(wire)));
        let (done, finished) = flume::bounded(1);
        let consumer = tokio::task::spawn_blocking(move || -> Result<DecodeReport> {
            let decoded = Reconstructor::new(source, config)?.decode_to(&mut io::sink());
            done.send(decoded.is_err()).ok();
            Ok(decoded?)
        });

        let work = async { consumer.await.context("decode worker panicked").and_then(|result| result) };
        let interrupted = until(work, async { Ok(()) }, &Bar::hidden(), &cancel).await;
        assert!(interrupted.unwrap_err().to_string().contains("interrupted"));
        assert!(cancel.is_cancelled());

        // The blocking decode fails on its next read instead of running to the end.
        assert!(finished.recv_async().await.unwrap());
    }

    #[tokio::test]
    async fn test_completed_work_is_not_cancelled() {
        let cancel = Cancel::default();
        let result = until(async { Ok(7) }, std::future::pending(), &Bar::hidden(), &cancel).await;
        assert_eq!(result.unwrap(), 7);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ArmorConfig { required_shards: 0, ..ArmorConfig::default() };
        assert!(Worker::new(config, false).is_err());
    }
}
