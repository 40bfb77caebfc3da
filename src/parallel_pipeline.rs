// THEORY:
// The blur never mixes rows, so a buffer can be cut into contiguous row bands and
// each band blurred by a different worker. The pool follows a dispatcher/worker
// layout: one dispatcher task receives band tasks and hands them out round-robin,
// and each worker runs the CPU-bound kernel on the blocking thread pool and replies
// through the task's oneshot channel.
//
// Workers only ever see an `Arc<PixelBuffer>` snapshot of the source and return
// freshly allocated bands, so the source and destination can never alias. Bands
// are stitched back together in row order once every reply has arrived.
//
// Decode and encode stay sequential and happen before and after the fan-out.

use crate::core_modules::blur;
use crate::core_modules::codec;
use crate::core_modules::error::{BlurError, CodecError};
use crate::core_modules::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::pipeline::{BlurReport, PipelineConfig, PipelineError};
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub struct BandTask {
    pub source: Arc<PixelBuffer>,
    pub rows: Range<usize>,
    pub amount: usize,
    pub result_sender: oneshot::Sender<Vec<Pixel>>,
}

/// Splits `rows` into `bands` contiguous ranges whose sizes differ by at most one.
pub fn band_ranges(rows: usize, bands: usize) -> Vec<Range<usize>> {
    let bands = bands.clamp(1, rows.max(1));
    let (base, extra) = (rows / bands, rows % bands);
    let mut start = 0;
    (0..bands)
        .map(|band| {
            let len = base + usize::from(band < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .filter(|range| !range.is_empty())
        .collect()
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<BandTask>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers plus a dispatcher. Must be called inside a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<BandTask>();
        let mut workers = Vec::with_capacity(size + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel::<BandTask>()).unzip();

        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    warn!("blur worker {} is gone; dropping band", worker_idx);
                }
                worker_idx = (worker_idx + 1) % worker_senders.len();
            }
        }));

        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let BandTask {
                        source,
                        rows,
                        amount,
                        result_sender,
                    } = task;
                    let band = tokio::task::spawn_blocking(move || blur::blur_band(&source, rows, amount)).await;
                    match band {
                        Ok(pixels) => {
                            let _ = result_sender.send(pixels);
                        }
                        // Dropping the sender tells the caller this band is lost.
                        Err(err) => warn!("blur worker {} failed a band: {}", worker_id, err),
                    }
                }
            }));
        }

        debug!("started blur worker pool with {} workers", size);
        Self {
            task_sender,
            workers,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Blurs `rows` of `source` on one of the workers.
    pub async fn blur_band(
        &self,
        source: Arc<PixelBuffer>,
        rows: Range<usize>,
        amount: usize,
    ) -> Result<Vec<Pixel>, PipelineError> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = BandTask {
            source,
            rows,
            amount,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| PipelineError::WorkerUnavailable)?;

        result_receiver.await.map_err(|_| PipelineError::WorkerUnavailable)
    }

    /// Closes the task queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// The read → blur → write pipeline with the blur fanned out over a worker pool.
pub struct ParallelPipeline {
    config: PipelineConfig,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Must be called inside a tokio runtime.
    pub fn new(config: PipelineConfig) -> Self {
        let size = config.worker_count.unwrap_or_else(num_cpus::get);
        let worker_pool = WorkerPool::new(size);
        Self { config, worker_pool }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.size()
    }

    /// Blurs `buffer` band by band. Produces exactly what `blur::blur` would.
    pub async fn process(&self, buffer: Arc<PixelBuffer>) -> Result<PixelBuffer, PipelineError> {
        if buffer.is_empty() {
            return Err(BlurError::EmptyBuffer {
                width: buffer.width(),
                height: buffer.height(),
            }
            .into());
        }

        let bands = band_ranges(buffer.height(), self.config.resolved_worker_count(buffer.height()).min(self.worker_pool.size()));
        debug!("blurring {} rows in {} bands", buffer.height(), bands.len());

        let amount = self.config.blur_amount;
        let results = try_join_all(
            bands
                .into_iter()
                .map(|rows| self.worker_pool.blur_band(Arc::clone(&buffer), rows, amount)),
        )
        .await?;

        let pixels: Vec<Pixel> = results.into_iter().flatten().collect();
        PixelBuffer::from_pixels(buffer.width(), buffer.height(), pixels)
            .map_err(|err| PipelineError::Codec(CodecError::Format(err)))
    }

    /// Reads `input`, blurs it on the pool, and writes the result to `output`.
    pub async fn run(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<BlurReport, PipelineError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        info!(
            "blurring {} -> {} on {} workers",
            input.display(),
            output.display(),
            self.worker_count()
        );

        let started = Instant::now();
        let buffer = tokio::fs::read(input)
            .await
            .map_err(CodecError::from)
            .and_then(|bytes| codec::decode(bytes.as_slice()))
            .map_err(|source| PipelineError::Read {
                path: input.to_path_buf(),
                source,
            })?;
        let decode_time = started.elapsed();

        let started = Instant::now();
        let blurred = self.process(Arc::new(buffer)).await?;
        let blur_time = started.elapsed();

        let started = Instant::now();
        let bytes = codec::encode_to_vec(&blurred, &self.config.encode_options());
        tokio::fs::write(output, bytes).await.map_err(|err| PipelineError::Write {
            path: output.to_path_buf(),
            source: err.into(),
        })?;
        let encode_time = started.elapsed();

        Ok(BlurReport {
            width: blurred.width(),
            height: blurred.height(),
            blur_amount: self.config.blur_amount,
            workers: self.worker_count(),
            decode_time,
            blur_time,
            encode_time,
        })
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
