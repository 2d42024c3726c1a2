//! Single-object tracking on top of [`Client`].
//!
//! The tracker keeps the last estimate of one object and refines from it on
//! every new frame. Each call runs on a worker thread so the caller can keep
//! capturing while the server works.

use crate::client::{Client, PoseQuery};
use crate::error::ClientError;
use megapose_protocol::{BoundingBox, ColorImage, PoseEstimate, Transform};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to an estimation running on a worker thread.
pub type PendingEstimate = JoinHandle<Result<PoseEstimate, ClientError>>;

/// Tracks one labelled object across frames.
pub struct PoseTracker {
    client: Arc<Client>,
    label: String,
    refiner_iterations: u32,
    state: Arc<Mutex<Option<PoseEstimate>>>,
}

impl PoseTracker {
    pub fn new(client: Arc<Client>, label: impl Into<String>, refiner_iterations: u32) -> Self {
        Self {
            client,
            label: label.into(),
            refiner_iterations,
            state: Arc::new(Mutex::new(None)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the last stored estimate.
    pub fn current(&self) -> Option<PoseEstimate> {
        self.state.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Initializes from a detection box.
    pub fn init_with_box(&self, image: ColorImage, bbox: BoundingBox) -> PendingEstimate {
        let query = PoseQuery::new([self.label.clone()]).with_detections(vec![bbox]);
        self.spawn(image, query)
    }

    /// Initializes from a known pose.
    pub fn init_with_pose(&self, image: ColorImage, pose: Transform) -> PendingEstimate {
        let query = PoseQuery::new([self.label.clone()])
            .with_initial_poses(vec![pose])
            .with_refiner_iterations(self.refiner_iterations);
        self.spawn(image, query)
    }

    /// Refines the stored pose against a new frame.
    pub fn track(&self, image: ColorImage) -> Result<PendingEstimate, ClientError> {
        let prior = self
            .state
            .lock()
            .as_ref()
            .map(|estimate| estimate.pose)
            .ok_or_else(|| ClientError::invalid("tracker not initialized"))?;

        let query = PoseQuery::new([self.label.clone()])
            .with_initial_poses(vec![prior])
            .with_refiner_iterations(self.refiner_iterations);
        Ok(self.spawn(image, query))
    }

    /// Replaces the stored pose, e.g. after an external correction.
    pub fn update_pose(&self, pose: Transform) {
        let mut state = self.state.lock();
        match state.as_mut() {
            Some(estimate) => estimate.pose = pose,
            None => {
                *state = Some(PoseEstimate {
                    label: self.label.clone(),
                    pose,
                    score: None,
                    bounding_box: None,
                })
            }
        }
    }

    fn spawn(&self, image: ColorImage, query: PoseQuery<'static>) -> PendingEstimate {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        thread::spawn(move || {
            let estimate = client
                .estimate_poses(&image, &query)?
                .into_iter()
                .next()
                .ok_or_else(|| ClientError::InvalidResponse("no estimate returned".to_string()))?;
            *state.lock() = Some(estimate.clone());
            Ok(estimate)
        })
    }
}
