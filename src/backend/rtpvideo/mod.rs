// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    backend::{
        render::SceneRenderer, Capabilities, FeedbackFlags, Mode, Output, OutputError,
        OutputEvent,
    },
    transport::{TransportError, VideoTransport, WireFormat},
    utils::{
        clock::PresentationClock,
        geometry::{Rectangle, Size},
        registry::ApiRegistry,
    },
};
use anyhow::{Context, Result};
use calloop::{
    channel::{channel, Channel, Sender},
    LoopHandle,
};
use rtpvideo_comp_config::RtpVideoConfig;
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, info, warn};

pub mod encoder;
pub mod modes;
pub mod pacing;
pub mod shadow;

use self::{
    encoder::{encode_region, frame_timestamp, EncodeStats},
    modes::{ModeTable, DEFAULT_REFRESH},
    pacing::{FramePacer, PacingConfig},
    shadow::{wire_format_to_layout, ShadowSurface},
};

pub const OUTPUT_NAME: &str = "RTP-0";
pub const OUTPUT_MAKE: &str = "rtpvideo-comp";
pub const OUTPUT_MODEL: &str = "rtpvideo";

/// Name the output-size API is published under in [`RtpVideoBackend::apis`].
pub const RTPVIDEO_OUTPUT_API_NAME: &str = "rtpvideo_output_api_v1";

/// Lets other in-process components size an output before it is first enabled.
#[derive(Debug, Clone, Copy)]
pub struct RtpVideoOutputApi {
    pub output_set_size: fn(&mut dyn Output, Size) -> Result<(), OutputError>,
}

fn output_set_size(output: &mut dyn Output, size: Size) -> Result<(), OutputError> {
    output.set_size(size)
}

/// State shared between an output and its timer callbacks.
pub struct Stream {
    transport: Box<dyn VideoTransport>,
    clock: Rc<dyn PresentationClock>,
    surface: Option<ShadowSurface>,
}

impl Stream {
    fn surface_size(&self) -> Option<Size> {
        self.surface.as_ref().map(ShadowSurface::size)
    }

    fn encode(&mut self, region: Rectangle) -> EncodeStats {
        let Some(surface) = self.surface.as_ref() else {
            return EncodeStats::default();
        };
        let timestamp = frame_timestamp(self.clock.now());
        encode_region(surface, region, self.transport.as_mut(), timestamp)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("format", &self.transport.video_format())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

pub struct RtpVideoOutput<D: 'static> {
    name: String,
    physical_size: Size,
    native_mode: Option<Mode>,
    modes: ModeTable,
    stream: Rc<RefCell<Stream>>,
    renderer: Box<dyn SceneRenderer>,
    pacer: FramePacer<D>,
    events: Sender<OutputEvent>,
    active: Rc<RefCell<Option<String>>>,
    enabled: bool,
}

impl<D> std::fmt::Debug for RtpVideoOutput<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpVideoOutput")
            .field("name", &self.name)
            .field("modes", &self.modes)
            .field("enabled", &self.enabled)
            .field("pacer", &self.pacer)
            .finish_non_exhaustive()
    }
}

impl<D: 'static> RtpVideoOutput<D> {
    fn new(
        name: &str,
        transport: Box<dyn VideoTransport>,
        clock: Rc<dyn PresentationClock>,
        renderer: Box<dyn SceneRenderer>,
        loop_handle: LoopHandle<'static, D>,
        events: Sender<OutputEvent>,
        active: Rc<RefCell<Option<String>>>,
    ) -> Self {
        RtpVideoOutput {
            name: name.to_string(),
            physical_size: Size::default(),
            native_mode: None,
            modes: ModeTable::new(),
            stream: Rc::new(RefCell::new(Stream {
                transport,
                clock,
                surface: None,
            })),
            renderer,
            pacer: FramePacer::new(loop_handle, PacingConfig::default()),
            events,
            active,
            enabled: false,
        }
    }

    pub fn make(&self) -> &str {
        OUTPUT_MAKE
    }

    pub fn model(&self) -> &str {
        OUTPUT_MODEL
    }

    /// Physical size in millimeters. There is no panel, so this mirrors the pixel size.
    pub fn physical_size(&self) -> Size {
        self.physical_size
    }

    pub fn native_mode(&self) -> Option<Mode> {
        self.native_mode
    }

    pub fn mode_table(&self) -> &ModeTable {
        &self.modes
    }

    pub fn wire_format(&self) -> WireFormat {
        self.stream.borrow().transport.video_format()
    }

    pub fn pacing(&self) -> PacingConfig {
        self.pacer.config()
    }

    /// Changes the timer intervals, re-arming the redraw timer of an enabled output.
    pub fn set_pacing(&mut self, config: PacingConfig) -> Result<(), OutputError> {
        self.pacer.set_config(config);
        if self.enabled {
            self.pacer.arm_redraw(self.stream.clone())?;
        }
        Ok(())
    }

    pub fn redraw_armed(&self) -> bool {
        self.pacer.redraw_armed()
    }

    pub fn finish_frame_pending(&self) -> bool {
        self.pacer.finish_frame_pending()
    }

    fn teardown(&mut self) {
        if !self.enabled {
            return;
        }
        self.pacer.disarm();
        self.stream.borrow_mut().surface = None;
        self.renderer.unbind_output();
        let mut active = self.active.borrow_mut();
        if active.as_deref() == Some(self.name.as_str()) {
            *active = None;
        }
        self.enabled = false;
    }
}

impl<D: 'static> Output for RtpVideoOutput<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_mode(&self) -> Option<Mode> {
        self.modes.current()
    }

    fn modes(&self) -> Vec<Mode> {
        self.modes.iter().map(|entry| entry.mode).collect()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_size(&mut self, size: Size) -> Result<(), OutputError> {
        if self.modes.current_id().is_some() {
            return Err(OutputError::SizeAlreadySet);
        }
        if size.is_empty() {
            return Err(OutputError::InvalidSize(size));
        }

        let id = self.modes.resolve(Mode {
            size,
            refresh: DEFAULT_REFRESH,
        })?;
        self.modes.set_current(id);
        self.modes.set_preferred(id);
        self.native_mode = self.modes.current();
        self.physical_size = size;
        debug!(output = %self.name, %size, "Output size set");
        Ok(())
    }

    fn enable(&mut self) -> Result<(), OutputError> {
        if self.enabled {
            return Err(OutputError::AlreadyEnabled {
                active: self.name.clone(),
            });
        }
        if let Some(active) = self.active.borrow().as_ref() {
            return Err(OutputError::AlreadyEnabled {
                active: active.clone(),
            });
        }
        let mode = self.modes.current().ok_or(OutputError::NoMode)?;

        let layout = wire_format_to_layout(self.wire_format());
        let surface = ShadowSurface::new(mode.size, layout)?;
        self.renderer.bind_output(mode.size)?;
        self.stream.borrow_mut().surface = Some(surface);

        if let Err(err) = self.pacer.arm_redraw(self.stream.clone()) {
            self.stream.borrow_mut().surface = None;
            self.renderer.unbind_output();
            return Err(err);
        }

        *self.active.borrow_mut() = Some(self.name.clone());
        self.enabled = true;
        info!(output = %self.name, size = %mode.size, ?layout, "Output enabled");
        Ok(())
    }

    fn disable(&mut self) -> Result<(), OutputError> {
        if self.enabled {
            self.teardown();
            info!(output = %self.name, "Output disabled");
        }
        Ok(())
    }

    fn switch_mode(&mut self, mode: Mode) -> Result<(), OutputError> {
        if mode.size.is_empty() {
            return Err(OutputError::InvalidSize(mode.size));
        }

        let id = self.modes.resolve(mode)?;
        if self.modes.current_id() == Some(id) {
            debug!(output = %self.name, size = %mode.size, "Mode unchanged");
            return Ok(());
        }

        if self.enabled {
            let size = mode.size;
            let layout = wire_format_to_layout(self.wire_format());
            let surface = match self.stream.borrow().surface.as_ref() {
                Some(old) => old.reformat(size, layout)?,
                None => ShadowSurface::new(size, layout)?,
            };

            self.renderer.unbind_output();
            if let Err(err) = self.renderer.bind_output(size) {
                if let Some(old) = self.stream.borrow().surface_size() {
                    if let Err(err) = self.renderer.bind_output(old) {
                        warn!(?err, output = %self.name, "Failed to restore renderer binding");
                    }
                }
                return Err(err.into());
            }
            // replaces the old buffer only once the content has been copied over
            self.stream.borrow_mut().surface = Some(surface);
        }

        self.modes.set_current(id);
        info!(output = %self.name, size = %mode.size, "Switched mode");
        Ok(())
    }

    fn start_repaint_loop(&mut self) {
        let presented = self.stream.borrow().clock.now();
        let event = OutputEvent::FrameFinished {
            output: self.name.clone(),
            presented,
            feedback: FeedbackFlags::INVALID,
        };
        if self.events.send(event).is_err() {
            warn!(output = %self.name, "Host is no longer listening for output events");
        }
    }

    fn repaint(&mut self, damage: Rectangle) -> Result<(), OutputError> {
        if !self.enabled {
            return Err(OutputError::NotEnabled);
        }

        let rendered = {
            let mut stream = self.stream.borrow_mut();
            let result = match stream.surface.as_mut() {
                Some(surface) => self.renderer.repaint(surface, damage),
                None => return Err(OutputError::NotEnabled),
            };
            match &result {
                Ok(()) if !damage.is_empty() => {
                    stream.encode(damage);
                }
                Ok(()) => {}
                Err(err) => warn!(?err, output = %self.name, "Failed to render frame"),
            }
            result
        };

        // the host waits for this event before it repaints again
        let clock = self.stream.borrow().clock.clone();
        self.pacer
            .schedule_finish_frame(&self.name, clock, self.events.clone())?;
        rendered.map_err(Into::into)
    }

    fn destroy(mut self: Box<Self>) {
        self.teardown();
        info!(output = %self.name, "Output destroyed");
    }
}

impl<D: 'static> Drop for RtpVideoOutput<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Backend streaming its single output over a video transport.
pub struct RtpVideoBackend<D: 'static> {
    outputs: Vec<RtpVideoOutput<D>>,
    active: Rc<RefCell<Option<String>>>,
    apis: ApiRegistry,
    capabilities: Capabilities,
}

impl<D> std::fmt::Debug for RtpVideoBackend<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpVideoBackend")
            .field("outputs", &self.outputs)
            .field("active", &self.active.borrow())
            .field("apis", &self.apis)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<D: 'static> RtpVideoBackend<D> {
    /// Creates the backend and its output.
    ///
    /// `open_session` opens the output's transport for the configured wire format.
    /// Finished frames are reported through the returned channel, which the host is
    /// expected to insert into its event loop.
    pub fn new<F>(
        config: &RtpVideoConfig,
        loop_handle: LoopHandle<'static, D>,
        renderer: Box<dyn SceneRenderer>,
        clock: Rc<dyn PresentationClock>,
        open_session: F,
    ) -> Result<(Self, Channel<OutputEvent>)>
    where
        F: FnOnce(WireFormat) -> Result<Box<dyn VideoTransport>, TransportError>,
    {
        config.validate().context("Invalid rtpvideo configuration")?;
        let format = WireFormat::from(config.colorspace().context("Invalid rtpvideo configuration")?);

        let mut transport = open_session(format)
            .with_context(|| format!("Failed to open video session for {:?}", format))?;
        match config.destination_address.as_deref() {
            Some(address) => transport
                .add_destination(address, config.destination_port)
                .with_context(|| {
                    format!(
                        "Failed to add destination {}:{}",
                        address, config.destination_port
                    )
                })?,
            None => warn!("No destination configured, frames will not be sent anywhere"),
        }
        if let Some(ssrc) = config.ssrc {
            transport.set_ssrc(ssrc);
        }

        let (sender, events) = channel();
        let active = Rc::new(RefCell::new(None));
        let output = RtpVideoOutput::new(
            OUTPUT_NAME,
            transport,
            clock,
            renderer,
            loop_handle,
            sender,
            active.clone(),
        );

        let mut apis = ApiRegistry::new();
        apis.register(
            RTPVIDEO_OUTPUT_API_NAME,
            RtpVideoOutputApi { output_set_size },
        )
        .context("Failed to register output api")?;

        info!(
            output = OUTPUT_NAME,
            ?format,
            destination = ?config.destination_address,
            port = config.destination_port,
            "Initialized rtpvideo backend"
        );
        Ok((
            RtpVideoBackend {
                outputs: vec![output],
                active,
                apis,
                capabilities: Capabilities::ARBITRARY_MODES,
            },
            events,
        ))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &RtpVideoOutput<D>> {
        self.outputs.iter()
    }

    pub fn output(&self, name: &str) -> Option<&RtpVideoOutput<D>> {
        self.outputs.iter().find(|output| output.name == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut RtpVideoOutput<D>> {
        self.outputs.iter_mut().find(|output| output.name == name)
    }

    /// Name of the output currently holding the backend's single active slot.
    pub fn active_output(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Removes and destroys an output. Returns false if no output has that name.
    pub fn destroy_output(&mut self, name: &str) -> bool {
        match self.outputs.iter().position(|output| output.name == name) {
            Some(idx) => {
                Box::new(self.outputs.remove(idx)).destroy();
                true
            }
            None => false,
        }
    }
}
