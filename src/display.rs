//! Display sink boundary.
//!
//! The windowing toolkit is an external component. The default build ships
//! [`HeadlessSink`], which only counts frames, so nothing in the core
//! pipeline needs a GUI stack; the `display-opencv` feature adds a real
//! window through OpenCV's highgui.

use anyhow::Result;
use image::RgbImage;

/// Where annotated frames go. `show` presents one frame and pumps one
/// event-loop tick; `close` tears the window down on shutdown.
pub trait DisplaySink: Send {
    fn open(&mut self) -> Result<()>;
    fn show(&mut self, image: &RgbImage) -> Result<()>;
    fn close(&mut self);
}

/// No-window sink for tests, CI, and machines without a display server.
#[derive(Default)]
pub struct HeadlessSink {
    frames_shown: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl DisplaySink for HeadlessSink {
    fn open(&mut self) -> Result<()> {
        log::info!("display: headless sink (no window)");
        Ok(())
    }

    fn show(&mut self, image: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        log::debug!(
            "display: frame #{} ({}x{})",
            self.frames_shown,
            image.width(),
            image.height()
        );
        Ok(())
    }

    fn close(&mut self) {}
}

/// Construct the display sink the build provides: an OpenCV window when the
/// `display-opencv` feature is on, the headless counter otherwise.
pub fn build_display(window_name: &str) -> Box<dyn DisplaySink> {
    #[cfg(feature = "display-opencv")]
    {
        Box::new(OpencvSink::new(window_name))
    }
    #[cfg(not(feature = "display-opencv"))]
    {
        let _ = window_name;
        Box::new(HeadlessSink::new())
    }
}

#[cfg(feature = "display-opencv")]
pub use opencv_sink::OpencvSink;

#[cfg(feature = "display-opencv")]
mod opencv_sink {
    use anyhow::{Context, Result};
    use image::RgbImage;
    use opencv::core::{Mat, MatTraitConst, CV_8UC3};
    use opencv::{highgui, imgproc};

    use super::DisplaySink;

    /// OpenCV highgui window. Frames arrive as RGB and are converted to the
    /// BGR layout highgui expects.
    pub struct OpencvSink {
        window_name: String,
        open: bool,
    }

    impl OpencvSink {
        pub fn new(window_name: &str) -> Self {
            Self {
                window_name: window_name.to_string(),
                open: false,
            }
        }
    }

    impl DisplaySink for OpencvSink {
        fn open(&mut self) -> Result<()> {
            highgui::named_window(&self.window_name, highgui::WINDOW_AUTOSIZE)
                .context("create display window")?;
            self.open = true;
            Ok(())
        }

        fn show(&mut self, image: &RgbImage) -> Result<()> {
            let (width, height) = (image.width() as i32, image.height() as i32);
            let rgb = Mat::from_slice(image.as_raw())
                .context("wrap frame bytes")?
                .reshape(3, height)
                .context("shape frame matrix")?;
            debug_assert_eq!(rgb.typ(), CV_8UC3);
            debug_assert_eq!(rgb.cols(), width);

            let mut bgr = Mat::default();
            imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)
                .context("convert frame to BGR")?;

            highgui::imshow(&self.window_name, &bgr).context("show frame")?;
            // One event-loop tick; keeps the window responsive.
            highgui::wait_key(1).context("pump window events")?;
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                if let Err(err) = highgui::destroy_window(&self.window_name) {
                    log::warn!("failed to destroy display window: {}", err);
                }
                self.open = false;
            }
        }
    }
}
