//! Decode lane
//!
//! One thread owns the page decoder and runs document operations and decodes
//! strictly in command order. The backend is built on the lane itself, so it
//! never has to cross threads.

use crate::cancel::CancellationToken;
use crate::inflight::JobId;
use crate::scheduler::Shared;
use crate::ticket::PageRequest;
use log::{debug, error};
use pdf_reader_render::{
    BackendError, DecoderBackend, DecoderError, DocumentInfo, DocumentSource, PageDecoder,
};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) const LANE_THREAD_NAME: &str = "pdf-render-lane";

pub(crate) enum LaneCommand {
    Open {
        source: DocumentSource,
        reply: Sender<Result<DocumentInfo, DecoderError>>,
    },
    Render(RenderJob),
    Close {
        reply: Sender<()>,
    },
    Shutdown,
}

pub(crate) struct RenderJob {
    pub job_id: JobId,
    pub generation: u64,
    pub request: PageRequest,
    pub token: CancellationToken,
}

/// Spawn the lane thread. `factory` runs on the new thread.
pub(crate) fn spawn<B, F>(
    factory: F,
    shared: Arc<Shared>,
    commands: Receiver<LaneCommand>,
) -> io::Result<JoinHandle<()>>
where
    B: DecoderBackend + 'static,
    F: FnOnce() -> Result<B, BackendError> + Send + 'static,
{
    thread::Builder::new().name(LANE_THREAD_NAME.to_owned()).spawn(move || {
        let decoder = factory().map(PageDecoder::new).map_err(|err| {
            error!("decoding backend unavailable: {err}");
            format!("decoding backend unavailable: {err}")
        });
        Lane { decoder, shared }.run(commands);
    })
}

struct Lane<B: DecoderBackend> {
    decoder: Result<PageDecoder<B>, String>,
    shared: Arc<Shared>,
}

impl<B: DecoderBackend> Lane<B> {
    fn run(mut self, commands: Receiver<LaneCommand>) {
        let mut revived: VecDeque<RenderJob> = VecDeque::new();

        loop {
            let command = match revived.pop_front() {
                Some(job) => LaneCommand::Render(job),
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            match command {
                LaneCommand::Open { source, reply } => {
                    let _ = reply.send(self.open(&source));
                }
                LaneCommand::Render(job) => {
                    if let Some(job) = self.render(job) {
                        revived.push_back(job);
                    }
                }
                LaneCommand::Close { reply } => {
                    if let Ok(decoder) = &mut self.decoder {
                        decoder.close();
                    }
                    let _ = reply.send(());
                }
                LaneCommand::Shutdown => break,
            }
        }

        debug!("render lane stopped");
    }

    fn open(&mut self, source: &DocumentSource) -> Result<DocumentInfo, DecoderError> {
        match &mut self.decoder {
            Ok(decoder) => decoder.open(source),
            Err(reason) => Err(DecoderError::Open(reason.clone())),
        }
    }

    /// Run one job. Returns the job again if it was revived after the decode
    /// gave up on it.
    fn render(&mut self, job: RenderJob) -> Option<RenderJob> {
        if !self.shared.begin_job(&job) {
            return None;
        }

        let PageRequest { page_index, width, height } = job.request;
        let result = match &mut self.decoder {
            Ok(decoder) => decoder.render_page_cancellable(page_index, width, height, &job.token),
            Err(_) => Err(DecoderError::NotOpen),
        };

        self.shared.finish_job(job, result)
    }
}
