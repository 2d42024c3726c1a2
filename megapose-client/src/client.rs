//! High-level client API.

use crate::connection::{ConnectionConfig, Transport};
use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use megapose_protocol::message::*;
use megapose_protocol::codec::decode_byte_string;
use megapose_protocol::{
    BoundingBox, CameraIntrinsics, ColorImage, DepthImage, Frame, FrameHeader, Transform,
    WireDecode, WireEncode,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

/// Arguments of a pose estimation request.
///
/// Exactly one of detections or initial poses must be given, with one entry
/// per label.
#[derive(Debug, Clone, Default)]
pub struct PoseQuery<'a> {
    labels: Vec<String>,
    detections: Option<Vec<BoundingBox>>,
    initial_poses: Option<Vec<Transform>>,
    depth: Option<(&'a DepthImage, f64)>,
    refiner_iterations: Option<u32>,
}

impl<'a> PoseQuery<'a> {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Locates objects from detection boxes (coarse + refine).
    pub fn with_detections(mut self, detections: Vec<BoundingBox>) -> Self {
        self.detections = Some(detections);
        self
    }

    /// Refines from prior poses (refine only).
    pub fn with_initial_poses(mut self, poses: Vec<Transform>) -> Self {
        self.initial_poses = Some(poses);
        self
    }

    /// Attaches a depth map; `scale_to_m` converts raw depth units to meters.
    pub fn with_depth(mut self, depth: &'a DepthImage, scale_to_m: f64) -> Self {
        self.depth = Some((depth, scale_to_m));
        self
    }

    pub fn with_refiner_iterations(mut self, iterations: u32) -> Self {
        self.refiner_iterations = Some(iterations);
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Checks the preconditions and builds the JSON document.
    fn to_params(&self) -> Result<PoseParams, ClientError> {
        let count = self.labels.len();
        match (&self.detections, &self.initial_poses) {
            (None, None) => {
                return Err(ClientError::invalid(
                    "either detections or initial poses must be provided",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ClientError::invalid(
                    "detections and initial poses are mutually exclusive",
                ))
            }
            (Some(d), None) if d.len() != count => {
                return Err(ClientError::invalid(format!(
                    "{} detections for {} labels",
                    d.len(),
                    count
                )))
            }
            (None, Some(p)) if p.len() != count => {
                return Err(ClientError::invalid(format!(
                    "{} initial poses for {} labels",
                    p.len(),
                    count
                )))
            }
            _ => {}
        }

        let depth_scale = match self.depth {
            Some((_, scale)) if !(scale.is_finite() && scale > 0.0) => {
                return Err(ClientError::invalid(format!(
                    "depth scale must be positive, got {}",
                    scale
                )))
            }
            Some((_, scale)) => Some(scale),
            None => None,
        };

        Ok(PoseParams {
            labels: self.labels.clone(),
            detections: self.detections.clone(),
            initial_poses: self.initial_poses.clone(),
            refiner_iterations: self.refiner_iterations,
            use_depth: self.depth.is_some(),
            depth_scale,
        })
    }
}

/// Client for a MegaPose server.
///
/// One connection, one request in flight: every call holds the connection
/// lock from the first byte sent to the last byte of the response. Share the
/// client between threads with `Arc`; open more clients for parallelism.
pub struct Client {
    conn: Mutex<Option<Transport>>,
    max_payload_size: u32,
    peer: SocketAddr,
}

impl Client {
    /// Connects and pushes the camera intrinsics.
    pub fn connect(
        config: ConnectionConfig,
        intrinsics: &CameraIntrinsics,
        height: u32,
        width: u32,
    ) -> Result<Self, ClientError> {
        let transport = Transport::connect(&config)?;
        let peer = match transport.peer_addr() {
            Some(addr) => addr,
            None => config.resolve()?,
        };
        let client = Self {
            conn: Mutex::new(Some(transport)),
            max_payload_size: config.max_payload_size,
            peer,
        };

        tracing::debug!("Sending camera intrinsics to {}", peer);
        client.set_intrinsics(intrinsics, height, width)?;
        Ok(client)
    }

    /// Connects with default settings.
    pub fn connect_to(
        host: &str,
        port: u16,
        intrinsics: &CameraIntrinsics,
        height: u32,
        width: u32,
    ) -> Result<Self, ClientError> {
        Self::connect(ConnectionConfig::new(host, port), intrinsics, height, width)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.conn.lock().as_ref().is_some_and(Transport::is_open)
    }

    /// Closes the connection. Later calls fail with `NotConnected`.
    pub fn close(&self) {
        if let Some(mut transport) = self.conn.lock().take() {
            transport.shutdown();
            tracing::debug!("Connection to {} closed", self.peer);
        }
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Sends one frame and reads the reply, all under the connection lock.
    ///
    /// Returns the payload if the reply carries `expected`.
    fn request(
        &self,
        code: MessageCode,
        payload: BytesMut,
        expected: MessageCode,
    ) -> Result<Bytes, ClientError> {
        let frame = Frame::new(code, payload.freeze());

        let mut guard = self.conn.lock();
        let transport = guard.as_mut().ok_or(ClientError::NotConnected)?;

        let result = Self::exchange(transport, &frame, self.max_payload_size)
            .and_then(|(header, payload)| Self::expect(&header, payload, expected));

        if let Err(ref err) = result {
            if err.is_fatal() {
                tracing::warn!(
                    "Dropping connection to {} after {} request failed: {}",
                    self.peer,
                    code,
                    err
                );
                if let Some(mut transport) = guard.take() {
                    transport.shutdown();
                }
            }
        }
        result
    }

    fn exchange(
        transport: &mut Transport,
        frame: &Frame,
        max_payload: u32,
    ) -> Result<(FrameHeader, Bytes), ClientError> {
        transport.send_frame(frame)?;
        tracing::debug!(
            "Sent {} request ({} payload bytes)",
            frame.code,
            frame.payload.len()
        );
        let (header, payload) = transport.recv_raw(max_payload)?;
        tracing::debug!(
            "Received {} reply ({} payload bytes)",
            header.tag_lossy(),
            payload.len()
        );
        Ok((header, payload))
    }

    /// Validates the reply code.
    ///
    /// An ERROR frame has been read in full, so even a malformed body leaves
    /// the stream aligned.
    fn expect(
        header: &FrameHeader,
        payload: Bytes,
        expected: MessageCode,
    ) -> Result<Bytes, ClientError> {
        match header.code {
            code if code == expected => Ok(payload),
            MessageCode::Error => {
                let mut payload = payload;
                match decode_byte_string(&mut payload) {
                    Ok(raw) => Err(ClientError::ServerError {
                        message: String::from_utf8_lossy(&raw).into_owned(),
                    }),
                    Err(e) => Err(ClientError::InvalidResponse(format!(
                        "malformed error message: {}",
                        e
                    ))),
                }
            }
            _ => Err(ClientError::UnexpectedMessage {
                expected,
                received: header.tag_lossy(),
            }),
        }
    }

    fn encode_json<T: Serialize>(params: &T, buf: &mut BytesMut) -> Result<(), ClientError> {
        serde_json::to_string(params)?.encode(buf);
        Ok(())
    }

    fn decode_json<T: serde::de::DeserializeOwned>(mut payload: Bytes) -> Result<T, ClientError> {
        let json = String::decode(&mut payload)?;
        Ok(serde_json::from_str(&json)?)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Sets the camera intrinsics and image size used by the server.
    pub fn set_intrinsics(
        &self,
        intrinsics: &CameraIntrinsics,
        height: u32,
        width: u32,
    ) -> Result<(), ClientError> {
        let mut payload = BytesMut::new();
        Self::encode_json(&IntrinsicsParams::new(intrinsics, height, width), &mut payload)?;
        self.request(MessageCode::SetIntrinsics, payload, MessageCode::Ok)?;
        Ok(())
    }

    /// Estimates the pose of each labelled object in `image`.
    ///
    /// Estimates are returned in label order.
    pub fn estimate_poses(
        &self,
        image: &ColorImage,
        query: &PoseQuery<'_>,
    ) -> Result<Vec<PoseEstimate>, ClientError> {
        let params = query.to_params()?;

        let mut payload = BytesMut::new();
        image.encode(&mut payload);
        Self::encode_json(&params, &mut payload)?;
        if let Some((depth, _)) = query.depth {
            depth.encode(&mut payload);
        }

        let reply = self.request(MessageCode::GetPose, payload, MessageCode::RetPose)?;
        let records: Vec<PoseRecord> = Self::decode_json(reply)?;
        if records.len() != query.labels.len() {
            return Err(ClientError::InvalidResponse(format!(
                "{} estimates for {} labels",
                records.len(),
                query.labels.len()
            )));
        }

        Ok(query
            .labels
            .iter()
            .zip(records)
            .map(|(label, record)| PoseEstimate::from_record(label.as_str(), record))
            .collect())
    }

    /// Scores how well each pose explains `image`.
    pub fn score_poses(
        &self,
        image: &ColorImage,
        labels: &[String],
        poses: &[Transform],
    ) -> Result<Vec<f64>, ClientError> {
        if poses.len() != labels.len() {
            return Err(ClientError::invalid(format!(
                "{} poses for {} labels",
                poses.len(),
                labels.len()
            )));
        }

        let params = ScoreParams {
            poses: poses.to_vec(),
            labels: labels.to_vec(),
        };
        let mut payload = BytesMut::new();
        image.encode(&mut payload);
        Self::encode_json(&params, &mut payload)?;

        let reply = self.request(MessageCode::GetScore, payload, MessageCode::RetScore)?;
        let scores = Self::decode_json::<ScoreReply>(reply)?.into_scores();
        if scores.len() != labels.len() {
            return Err(ClientError::InvalidResponse(format!(
                "{} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        Ok(scores)
    }

    /// Renders the objects at the given poses.
    ///
    /// `view_kind` selects the server-side rendering mode.
    pub fn render_views(
        &self,
        labels: &[String],
        poses: &[Transform],
        view_kind: &str,
    ) -> Result<ColorImage, ClientError> {
        if poses.len() != labels.len() {
            return Err(ClientError::invalid(format!(
                "{} poses for {} labels",
                poses.len(),
                labels.len()
            )));
        }

        let params = ViewParams {
            labels: labels.to_vec(),
            poses: poses.to_vec(),
            view_kind: view_kind.to_string(),
        };
        let mut payload = BytesMut::new();
        Self::encode_json(&params, &mut payload)?;

        let mut reply = self.request(
            MessageCode::GetVisualization,
            payload,
            MessageCode::RetVisualization,
        )?;
        Ok(ColorImage::decode(&mut reply)?)
    }

    /// Sets how many rotations the coarse estimator samples.
    pub fn set_solver_grid_size(&self, grid_size: u32) -> Result<(), ClientError> {
        let mut payload = BytesMut::new();
        Self::encode_json(
            &SolverParams {
                so3_grid_size: grid_size,
            },
            &mut payload,
        )?;
        self.request(MessageCode::SetSolverParam, payload, MessageCode::Ok)?;
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
