#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wallpaint_application::SessionCoordinator;
use wallpaint_core::config::WallPaintConfig;
use wallpaint_core::error::ServiceFailure;
use wallpaint_core::event::{SessionEvent, SessionEventKind};
use wallpaint_core::image::{ImageHash, ImageSize, UploadedImage};
use wallpaint_core::service::{
    DetectionOutcome, MaskVisualization, PaintOutcome, PaintRequest, SegmentationService,
    ServiceHealth, ServiceResult,
};
use wallpaint_core::wall::{WallInfo, WallType};
use tokio::sync::mpsc;

/// In-memory segmentation service with scripted latencies and failures.
pub struct ScriptedService {
    pub sam_loaded: Mutex<bool>,
    pub walls: Mutex<Vec<WallInfo>>,
    pub detect_delay: Mutex<Duration>,
    pub paint_delay: Mutex<Duration>,
    detect_failures: Mutex<VecDeque<ServiceFailure>>,
    paint_failures: Mutex<VecDeque<ServiceFailure>>,
    detect_calls: Mutex<usize>,
    paint_requests: Mutex<Vec<PaintRequest>>,
    cached: Mutex<usize>,
}

impl ScriptedService {
    pub fn with_walls(count: usize) -> Arc<Self> {
        Arc::new(Self {
            sam_loaded: Mutex::new(true),
            walls: Mutex::new(walls(count)),
            detect_delay: Mutex::new(Duration::from_millis(200)),
            paint_delay: Mutex::new(Duration::from_millis(150)),
            detect_failures: Mutex::new(VecDeque::new()),
            paint_failures: Mutex::new(VecDeque::new()),
            detect_calls: Mutex::new(0),
            paint_requests: Mutex::new(Vec::new()),
            cached: Mutex::new(0),
        })
    }

    pub fn set_detect_delay(&self, delay: Duration) {
        *self.detect_delay.lock().unwrap() = delay;
    }

    pub fn set_paint_delay(&self, delay: Duration) {
        *self.paint_delay.lock().unwrap() = delay;
    }

    pub fn fail_next_detect(&self, failure: ServiceFailure) {
        self.detect_failures.lock().unwrap().push_back(failure);
    }

    pub fn fail_next_paint(&self, failure: ServiceFailure) {
        self.paint_failures.lock().unwrap().push_back(failure);
    }

    pub fn paint_requests(&self) -> Vec<PaintRequest> {
        self.paint_requests.lock().unwrap().clone()
    }

    pub fn paint_count(&self) -> usize {
        self.paint_requests.lock().unwrap().len()
    }

    pub fn detect_count(&self) -> usize {
        *self.detect_calls.lock().unwrap()
    }
}

#[async_trait]
impl SegmentationService for ScriptedService {
    async fn health(&self) -> ServiceResult<ServiceHealth> {
        Ok(ServiceHealth {
            sam_loaded: *self.sam_loaded.lock().unwrap(),
            status: Some("healthy".to_string()),
            device: None,
            cached_images: Some(*self.cached.lock().unwrap()),
        })
    }

    async fn detect(&self, _image: &UploadedImage) -> ServiceResult<DetectionOutcome> {
        let call = {
            let mut calls = self.detect_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        let delay = *self.detect_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if let Some(failure) = self.detect_failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        *self.cached.lock().unwrap() += 1;
        Ok(DetectionOutcome {
            image_hash: ImageHash::new(format!("hash-{call}")),
            walls: self.walls.lock().unwrap().clone(),
            image_size: Some(ImageSize {
                width: 640,
                height: 480,
            }),
            from_cache: false,
            service_time: Some(Duration::from_millis(120)),
        })
    }

    async fn paint(&self, request: &PaintRequest) -> ServiceResult<PaintOutcome> {
        let call = {
            let mut requests = self.paint_requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        let delay = *self.paint_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if let Some(failure) = self.paint_failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        Ok(PaintOutcome {
            image: format!("painted-{call}"),
            walls_painted: request.wall_ids.len(),
            service_time: Some(Duration::from_millis(30)),
        })
    }

    async fn visualize_masks(&self, image_hash: &ImageHash) -> ServiceResult<MaskVisualization> {
        Ok(MaskVisualization {
            image: format!("masks-{image_hash}"),
            walls_found: self.walls.lock().unwrap().len(),
        })
    }

    async fn clear_cache(&self) -> ServiceResult<usize> {
        let mut cached = self.cached.lock().unwrap();
        let cleared = *cached;
        *cached = 0;
        Ok(cleared)
    }
}

pub fn walls(count: usize) -> Vec<WallInfo> {
    (0..count)
        .map(|id| WallInfo {
            id,
            wall_type: if id == 0 { WallType::Main } else { WallType::Other },
            area: 10_000 - id as u64 * 1000,
            confidence: 0.9,
            area_percentage: Some(20.0),
            bbox: Some([0, 0, 100, 100]),
        })
        .collect()
}

pub fn room_image(name: &str) -> UploadedImage {
    UploadedImage::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
}

pub fn coordinator(service: Arc<ScriptedService>) -> SessionCoordinator {
    SessionCoordinator::new(service, WallPaintConfig::default()).unwrap()
}

/// Health check, upload and detection, then waits for the initial paint.
pub async fn detected_session(wall_count: usize) -> (Arc<ScriptedService>, SessionCoordinator) {
    let service = ScriptedService::with_walls(wall_count);
    let coordinator = coordinator(service.clone());
    coordinator.check_health().await.unwrap();
    coordinator.upload(room_image("room.jpg")).await.unwrap();
    coordinator.detect().await.unwrap().expect("detection applied");
    coordinator.wait_until_settled().await;
    (service, coordinator)
}

pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

pub async fn assert_selection_within_domain(coordinator: &SessionCoordinator) {
    let view = coordinator.view().await;
    let domain = view.walls.iter().map(|wall| wall.id).collect();
    assert!(
        view.selected.is_subset(&domain),
        "selection {:?} escapes domain {:?}",
        view.selected,
        domain
    );
}
