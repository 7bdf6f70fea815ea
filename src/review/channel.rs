use std::sync::mpsc;

use super::context::PointContext;
use super::session::ReviewSession;
use super::Reviewer;
use crate::analysis::verdict::Verdict;
use crate::error::{ReviewError, ScanError};

/// What the review side sends back for one point.
pub type ReviewReply = Result<(Verdict, PointContext), ReviewError>;

// ---------------------------------------------------------------------------
// ReviewGate – how the scan waits for an operator
// ---------------------------------------------------------------------------

/// Hands a point to an operator and blocks until it is resolved.
pub trait ReviewGate {
    fn review(&mut self, point: PointContext) -> Result<(Verdict, PointContext), ScanError>;
}

fn scan_error(point: usize, err: ReviewError) -> ScanError {
    match err {
        ReviewError::Pipeline(source) => ScanError::Point { point, source },
        ReviewError::Abandoned => ScanError::ReviewClosed { point },
    }
}

/// Runs the session on the calling thread.
#[derive(Debug)]
pub struct InlineGate<R> {
    reviewer: R,
}

impl<R: Reviewer> InlineGate<R> {
    pub fn new(reviewer: R) -> Self {
        InlineGate { reviewer }
    }

    pub fn into_inner(self) -> R {
        self.reviewer
    }
}

impl<R: Reviewer> ReviewGate for InlineGate<R> {
    fn review(&mut self, point: PointContext) -> Result<(Verdict, PointContext), ScanError> {
        let index = point.index;
        ReviewSession::new(point)
            .run(&mut self.reviewer)
            .map_err(|e| scan_error(index, e))
    }
}

// ---------------------------------------------------------------------------
// Cross-thread review
// ---------------------------------------------------------------------------

/// A point waiting for an operator, with its one-shot reply slot.
#[derive(Debug)]
pub struct ReviewRequest {
    pub point: PointContext,
    reply: mpsc::SyncSender<ReviewReply>,
}

/// Scan-side end: sends points out and blocks on the reply.
#[derive(Debug, Clone)]
pub struct ChannelGate {
    requests: mpsc::Sender<ReviewRequest>,
}

/// Review-side end: receives points and answers them one at a time.
#[derive(Debug)]
pub struct ReviewDesk {
    requests: mpsc::Receiver<ReviewRequest>,
}

/// Connected gate/desk pair.
pub fn review_channel() -> (ChannelGate, ReviewDesk) {
    let (tx, rx) = mpsc::channel();
    (ChannelGate { requests: tx }, ReviewDesk { requests: rx })
}

impl ReviewGate for ChannelGate {
    fn review(&mut self, point: PointContext) -> Result<(Verdict, PointContext), ScanError> {
        let index = point.index;
        let (reply, resolved) = mpsc::sync_channel(1);
        self.requests
            .send(ReviewRequest { point, reply })
            .map_err(|_| ScanError::ReviewClosed { point: index })?;

        log::debug!("point {index}: waiting for review");
        match resolved.recv() {
            Ok(result) => result.map_err(|e| scan_error(index, e)),
            Err(_) => Err(ScanError::ReviewClosed { point: index }),
        }
    }
}

impl ReviewDesk {
    /// Take the next point, blocking; `None` once the scan side is gone.
    pub fn next_request(&self) -> Option<ReviewRequest> {
        self.requests.recv().ok()
    }

    /// Answer every incoming point with `reviewer` until the scan finishes.
    /// Stops early if the reviewer gives up. Returns the number of verdicts
    /// given.
    pub fn serve<R: Reviewer + ?Sized>(self, reviewer: &mut R) -> usize {
        let mut resolved = 0;
        while let Some(request) = self.next_request() {
            let index = request.point.index;
            let result = ReviewSession::new(request.point).run(reviewer);
            let abandoned = matches!(result, Err(ReviewError::Abandoned));
            if result.is_ok() {
                resolved += 1;
            }
            if request.reply.send(result).is_err() {
                log::warn!("point {index}: scan stopped waiting before the verdict arrived");
            }
            if abandoned {
                log::warn!("point {index}: review abandoned, closing the desk");
                break;
            }
        }
        resolved
    }
}
