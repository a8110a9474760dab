//! Counter-side scan flow.
//!
//! A [`ScanSession`] walks `ready → opening-camera → scanning → detected →
//! redeeming → success | error`. Events that do not apply to the current
//! state are rejected without changing it. [`CounterScanner`] drives a
//! session through one attempt against the [`Validator`].

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::codes::{is_token, normalize_manual_code};
use super::models::{Redemption, RedemptionError, ScanInput};
use super::validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanState {
    Ready,
    OpeningCamera,
    Scanning,
    Detected,
    Redeeming,
    Success,
    Error,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Success | ScanState::Error)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Ready => "ready",
            ScanState::OpeningCamera => "opening-camera",
            ScanState::Scanning => "scanning",
            ScanState::Detected => "detected",
            ScanState::Redeeming => "redeeming",
            ScanState::Success => "success",
            ScanState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    OpenCamera,
    CameraReady,
    CameraDenied,
    DetectorUnsupported,
    /// Raw text read from a QR code.
    CodeDetected(String),
    /// Code typed by staff.
    ManualEntry(String),
    Redeem,
    Redeemed(Redemption),
    Failed(RedemptionError),
    Reset,
}

impl ScanEvent {
    fn name(&self) -> &'static str {
        match self {
            ScanEvent::OpenCamera => "open-camera",
            ScanEvent::CameraReady => "camera-ready",
            ScanEvent::CameraDenied => "camera-denied",
            ScanEvent::DetectorUnsupported => "detector-unsupported",
            ScanEvent::CodeDetected(_) => "code-detected",
            ScanEvent::ManualEntry(_) => "manual-entry",
            ScanEvent::Redeem => "redeem",
            ScanEvent::Redeemed(_) => "redeemed",
            ScanEvent::Failed(_) => "failed",
            ScanEvent::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("Camera permission denied; enter the manual code instead")]
    CameraDenied,

    #[error(transparent)]
    Rejected(#[from] RedemptionError),

    #[error("Cannot handle {event} while {state}")]
    InvalidTransition { state: ScanState, event: &'static str },
}

impl ScanError {
    pub fn reason(&self) -> &'static str {
        match self {
            ScanError::CameraDenied => "camera_denied",
            ScanError::Rejected(e) => e.reason(),
            ScanError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Turns scanned or typed text into a claim lookup.
///
/// Accepts the landing URL (`.../r/<token>`), a bare token, or a manual code.
pub fn decode_payload(raw: &str) -> Result<ScanInput, RedemptionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(RedemptionError::InvalidCode("empty payload".to_string()));
    }

    let candidate = match text.rfind("/r/") {
        Some(idx) => text[idx + 3..]
            .split(|c| c == '?' || c == '#' || c == '/')
            .next()
            .unwrap_or_default(),
        None => text,
    };

    if is_token(candidate) {
        return Ok(ScanInput::Token(candidate.to_ascii_lowercase()));
    }
    if let Some(code) = normalize_manual_code(candidate) {
        return Ok(ScanInput::ManualCode(code));
    }
    Err(RedemptionError::InvalidCode(
        "not a deal QR code or manual code".to_string(),
    ))
}

/// Reads the first QR code in an uploaded camera frame.
pub fn detect_qr_payload(bytes: &[u8]) -> Result<String, RedemptionError> {
    let frame = image::load_from_memory(bytes)
        .map_err(|e| RedemptionError::InvalidCode(format!("unreadable image: {}", e)))?;

    let mut prepared = rqrr::PreparedImage::prepare(frame.to_luma8());
    let grids = prepared.detect_grids();
    let grid = grids.first().ok_or(RedemptionError::DetectorUnsupported)?;

    let (_meta, content) = grid
        .decode()
        .map_err(|_| RedemptionError::DetectorUnsupported)?;
    Ok(content)
}

/// One scan attempt at the counter.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSession {
    state: ScanState,
    trace: Vec<ScanState>,
    #[serde(skip)]
    input: Option<ScanInput>,
    #[serde(skip)]
    redemption: Option<Redemption>,
    #[serde(skip)]
    failure: Option<ScanError>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            state: ScanState::Ready,
            trace: vec![ScanState::Ready],
            input: None,
            redemption: None,
            failure: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Every state visited, in order.
    pub fn trace(&self) -> &[ScanState] {
        &self.trace
    }

    pub fn input(&self) -> Option<&ScanInput> {
        self.input.as_ref()
    }

    pub fn failure(&self) -> Option<&ScanError> {
        self.failure.as_ref()
    }

    pub fn apply(&mut self, event: ScanEvent) -> Result<ScanState, ScanError> {
        use ScanEvent as E;
        use ScanState as S;

        let invalid = ScanError::InvalidTransition {
            state: self.state,
            event: event.name(),
        };

        match (self.state, event) {
            (S::Ready, E::OpenCamera) => self.enter(S::OpeningCamera),
            (S::OpeningCamera, E::CameraReady) => self.enter(S::Scanning),
            (S::OpeningCamera, E::CameraDenied) => self.fail(ScanError::CameraDenied),
            (S::OpeningCamera | S::Scanning, E::DetectorUnsupported) => {
                self.fail(RedemptionError::DetectorUnsupported.into())
            }
            (S::Scanning, E::CodeDetected(raw)) => self.detect(decode_payload(&raw)),
            (S::Ready | S::Scanning, E::ManualEntry(raw)) => {
                let parsed = normalize_manual_code(&raw)
                    .map(ScanInput::ManualCode)
                    .ok_or_else(|| RedemptionError::InvalidCode("manual codes have 5 characters".to_string()));
                self.detect(parsed)
            }
            (S::Detected, E::Redeem) => self.enter(S::Redeeming),
            (S::Redeeming, E::Redeemed(redemption)) => {
                self.redemption = Some(redemption);
                self.enter(S::Success)
            }
            (S::Scanning | S::Redeeming, E::Failed(err)) => self.fail(err.into()),
            (S::Success | S::Error, E::Reset) => *self = Self::new(),
            _ => return Err(invalid),
        }
        Ok(self.state)
    }

    fn enter(&mut self, next: ScanState) {
        self.state = next;
        self.trace.push(next);
    }

    fn fail(&mut self, err: ScanError) {
        self.failure = Some(err);
        self.enter(ScanState::Error);
    }

    fn detect(&mut self, parsed: Result<ScanInput, RedemptionError>) {
        match parsed {
            Ok(input) => {
                self.input = Some(input);
                self.enter(ScanState::Detected);
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Final outcome of a terminal session.
    /// Result of a finished attempt. Asking before the session reaches
    /// `success` or `error` is an invalid transition.
    pub fn outcome(&self) -> Result<Redemption, ScanError> {
        let unfinished = ScanError::InvalidTransition {
            state: self.state,
            event: "outcome",
        };
        if !self.state.is_terminal() {
            return Err(unfinished);
        }
        match (&self.redemption, &self.failure) {
            (Some(redemption), _) => Ok(redemption.clone()),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(unfinished),
        }
    }
}

/// Drives scan sessions for one counter against the validator.
#[derive(Clone)]
pub struct CounterScanner {
    validator: Arc<Validator>,
}

impl CounterScanner {
    pub fn new(validator: Arc<Validator>) -> Self {
        Self { validator }
    }

    /// Text already read by an on-device detector.
    pub async fn scan_payload(&self, merchant_id: Uuid, payload: &str) -> ScanSession {
        let mut session = Self::camera_session();
        let _ = session.apply(ScanEvent::CodeDetected(payload.to_string()));
        self.finish(session, merchant_id).await
    }

    /// A camera frame decoded on the server.
    pub async fn scan_image(&self, merchant_id: Uuid, frame: &[u8]) -> ScanSession {
        let mut session = Self::camera_session();
        let event = match detect_qr_payload(frame) {
            Ok(payload) => ScanEvent::CodeDetected(payload),
            Err(RedemptionError::DetectorUnsupported) => ScanEvent::DetectorUnsupported,
            Err(other) => ScanEvent::Failed(other),
        };
        let _ = session.apply(event);
        self.finish(session, merchant_id).await
    }

    pub async fn enter_code(&self, merchant_id: Uuid, code: &str) -> ScanSession {
        let mut session = ScanSession::new();
        let _ = session.apply(ScanEvent::ManualEntry(code.to_string()));
        self.finish(session, merchant_id).await
    }

    fn camera_session() -> ScanSession {
        let mut session = ScanSession::new();
        let _ = session.apply(ScanEvent::OpenCamera);
        let _ = session.apply(ScanEvent::CameraReady);
        session
    }

    async fn finish(&self, mut session: ScanSession, merchant_id: Uuid) -> ScanSession {
        let Some(input) = session.input().cloned() else {
            return session;
        };
        if session.apply(ScanEvent::Redeem).is_err() {
            return session;
        }

        let event = match self.validator.redeem_for_merchant(merchant_id, input).await {
            Ok(redemption) => ScanEvent::Redeemed(redemption),
            Err(e) => ScanEvent::Failed(e),
        };
        let _ = session.apply(event);
        session
    }
}
