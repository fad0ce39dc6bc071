//! Garment catalog and the capture → analyze → refetch pipeline

mod types;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{CaptureError, Error};
use crate::fetch::Gateway;
use crate::flight::SingleFlight;

pub use types::*;

/// Client for the garment endpoints
#[derive(Clone)]
pub struct GarmentClient {
    gateway: Gateway,
    page_size: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalyzeResponse {
    /// `{garment, analysis}` as returned when the backend also stores the garment
    Stored { analysis: AnalysisResult },
    Bare(AnalysisResult),
}

impl GarmentClient {
    pub fn new(gateway: Gateway, page_size: u32) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
        }
    }

    /// `GET /garment` for one page of a user's garments
    pub async fn list(&self, user_id: &str, filter: &GarmentFilter) -> Result<Vec<Garment>, Error> {
        self.gateway
            .get("/garment")
            .query("page", filter.page)
            .query("limit", self.page_size)
            .query("user_id", user_id)
            .query("category", filter.category_param())
            .query_opt("color", filter.color.as_deref())
            .query_opt("brand", filter.brand.as_deref())
            .execute::<Vec<Garment>>()
            .await
    }

    /// Upload a photo as the multipart `image` field for remote analysis
    pub async fn analyze(&self, image: &ImageHandle) -> Result<AnalysisResult, Error> {
        let bytes = image.read().await?;
        let mut part = Part::bytes(bytes).file_name(image.file_name());
        // A bare `image` type is not a valid MIME string; let reqwest pick one.
        let mime = image.mime_type();
        if mime.contains('/') {
            part = part.mime_str(&mime)?;
        }
        let form = Form::new().part("image", part);

        let response = self
            .gateway
            .post("/garment/analyze")
            .multipart(form)
            .execute::<AnalyzeResponse>()
            .await?;

        Ok(match response {
            AnalyzeResponse::Stored { analysis } => analysis,
            AnalyzeResponse::Bare(analysis) => analysis,
        })
    }

    /// `DELETE /garment/{id}`
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.gateway
            .delete(&format!("/garment/{}", id))
            .execute_empty()
            .await
    }
}

/// The device camera, as far as the pipeline is concerned
#[async_trait]
pub trait Camera: Send + Sync {
    /// Ask for camera access; `false` when the user refuses
    async fn request_permission(&self) -> bool;

    /// Take a photo; `None` when the user cancels
    async fn capture(&self) -> Option<ImageHandle>;
}

/// Result of a capture attempt that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The user backed out of the camera; nothing changed
    Canceled,
    Analyzed(AnalysisResult),
}

/// Result of a list refetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOutcome {
    /// The response replaced the visible list
    Applied(usize),
    /// A newer refetch was issued meanwhile; this response was dropped
    Superseded,
}

#[derive(Debug, Default)]
struct ClosetState {
    garments: Vec<Garment>,
    filter: GarmentFilter,
    pending: Option<PendingGarment>,
}

/// Session-scoped garment cache for one user, plus the capture pipeline
pub struct Closet {
    client: GarmentClient,
    user_id: String,
    state: Mutex<ClosetState>,
    latest_request: AtomicU64,
    capture_flight: SingleFlight,
}

/// Drops the pending entry unless the analysis got far enough to keep it
struct PendingReset<'a> {
    closet: &'a Closet,
    armed: bool,
}

impl Drop for PendingReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.closet.lock().pending = None;
        }
    }
}

impl Closet {
    pub fn new(client: GarmentClient, user_id: &str) -> Self {
        Self {
            client,
            user_id: user_id.to_string(),
            state: Mutex::new(ClosetState::default()),
            latest_request: AtomicU64::new(0),
            capture_flight: SingleFlight::new(),
        }
    }

    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, ClosetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The garments currently displayed
    pub fn garments(&self) -> Vec<Garment> {
        self.lock().garments.clone()
    }

    /// The filter of the most recent refetch
    pub fn filter(&self) -> GarmentFilter {
        self.lock().filter.clone()
    }

    /// The capture being analyzed, if any.
    ///
    /// Set when the upload starts and filled in from the analysis. It is
    /// cleared by the next refetch that gets applied; when the refetch right
    /// after the analysis fails, the analyzed entry stays visible until a
    /// later refetch succeeds.
    pub fn pending(&self) -> Option<PendingGarment> {
        self.lock().pending.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_flight.is_busy()
    }

    /// Reload the list for `filter`.
    ///
    /// Each call takes a new request number and only the most recent one may
    /// replace the list. On failure the previous list stays in place.
    pub async fn refetch(&self, filter: GarmentFilter) -> Result<RefetchOutcome, Error> {
        let ticket = self.latest_request.fetch_add(1, Ordering::AcqRel) + 1;
        self.lock().filter = filter.clone();

        let result = self.client.list(&self.user_id, &filter).await;

        let mut state = self.lock();
        if self.latest_request.load(Ordering::Acquire) != ticket {
            debug!("Dropping garment list #{}, a newer request was issued", ticket);
            return Ok(RefetchOutcome::Superseded);
        }

        match result {
            Ok(garments) => {
                let count = garments.len();
                state.garments = garments;
                state.pending = None;
                Ok(RefetchOutcome::Applied(count))
            }
            Err(e) => {
                warn!("Garment refetch failed, keeping {} cached: {}", state.garments.len(), e);
                Err(e)
            }
        }
    }

    /// Take a photo and run it through analysis.
    ///
    /// Rejected with [`CaptureError::Busy`] while another capture is running.
    pub async fn capture(&self, camera: &dyn Camera) -> Result<CaptureOutcome, CaptureError> {
        let _flight = self.capture_flight.try_begin().ok_or(CaptureError::Busy)?;

        if !camera.request_permission().await {
            return Err(CaptureError::PermissionDenied);
        }

        match camera.capture().await {
            Some(image) => self.run_analysis(image).await.map(CaptureOutcome::Analyzed),
            None => {
                debug!("Capture canceled");
                Ok(CaptureOutcome::Canceled)
            }
        }
    }

    /// Analyze an image that did not come from the camera
    pub async fn analyze(&self, image: ImageHandle) -> Result<AnalysisResult, CaptureError> {
        let _flight = self.capture_flight.try_begin().ok_or(CaptureError::Busy)?;
        self.run_analysis(image).await
    }

    // Caller holds the capture flight.
    async fn run_analysis(&self, image: ImageHandle) -> Result<AnalysisResult, CaptureError> {
        self.lock().pending = Some(PendingGarment::new(image.clone()));
        let mut reset = PendingReset {
            closet: self,
            armed: true,
        };

        info!("Uploading {} for analysis", image.file_name());
        let analysis = self.client.analyze(&image).await?;

        if let Some(pending) = self.lock().pending.as_mut() {
            pending.merge(&analysis);
        }
        reset.armed = false;

        // The stored record (id, storage URL) only exists server-side.
        let filter = self.filter();
        if let Err(e) = self.refetch(filter).await {
            warn!("Refetch after analysis failed, keeping the pending entry: {}", e);
        }

        Ok(analysis)
    }

    /// Delete a garment remotely and drop it from the list
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.client.delete(id).await?;
        self.lock().garments.retain(|garment| garment.id != id);
        Ok(())
    }
}
