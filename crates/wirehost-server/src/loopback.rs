//! A renderer-less surface.
//!
//! [`LoopbackSurface`] lets the server run without a real content surface.
//! It records navigation history so back/forward behave, reports an empty
//! cookie jar, and refuses anything that needs a renderer.

use url::Url;

use wirehost_core::driver::{Cookie, Surface, SurfaceFault};

#[derive(Debug, Default)]
pub struct LoopbackSurface {
    back: Vec<Url>,
    current: Option<Url>,
    forward: Vec<Url>,
}

impl LoopbackSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for LoopbackSurface {
    fn evaluate(&mut self, _script: &str) -> Result<Option<String>, SurfaceFault> {
        Err(SurfaceFault::Script("no renderer attached".to_string()))
    }

    fn navigate(&mut self, uri: &Url) -> Result<(), SurfaceFault> {
        if let Some(previous) = self.current.replace(uri.clone()) {
            self.back.push(previous);
        }
        self.forward.clear();
        Ok(())
    }

    fn capture_image(&mut self) -> Result<Vec<u8>, SurfaceFault> {
        Err(SurfaceFault::Capture("no renderer attached".to_string()))
    }

    fn cookies(&mut self) -> Result<Vec<Cookie>, SurfaceFault> {
        Ok(Vec::new())
    }

    fn can_go_back(&self) -> bool {
        !self.back.is_empty()
    }

    fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    fn go_back(&mut self) {
        if let Some(previous) = self.back.pop() {
            if let Some(current) = self.current.replace(previous) {
                self.forward.push(current);
            }
        }
    }

    fn go_forward(&mut self) {
        if let Some(next) = self.forward.pop() {
            if let Some(current) = self.current.replace(next) {
                self.back.push(current);
            }
        }
    }
}
