// backend.rs — execution backend selection.
//
// Two backends produce bit-comparable results (floating-point rounding
// aside): the scalar CPU reference and the wgpu compute engine. GPU probing
// happens once, at detector construction; a failed probe downgrades to the
// CPU path with a logged diagnostic and is never surfaced as an error.

use crate::gpu::GpuEngine;

/// The execution strategy behind a detector instance.
pub enum Backend {
    /// Scalar CPU implementation. Always available.
    Reference,
    /// wgpu compute engine, fixed to the detector's resolution.
    Accelerated(GpuEngine),
}

impl Backend {
    /// Probe for a compute device and build the stage pipelines.
    ///
    /// Any failure (no adapter, device request rejected) selects the CPU
    /// backend; the cause is logged at warn level.
    pub fn detect(width: usize, height: usize) -> Backend {
        match GpuEngine::new(width, height) {
            Ok(engine) => {
                log::info!("acceleration enabled on {}", engine.adapter_name());
                Backend::Accelerated(engine)
            }
            Err(e) => {
                log::warn!("acceleration unavailable, using CPU path: {e}");
                Backend::Reference
            }
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self, Backend::Accelerated(_))
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Reference => write!(f, "Backend::Reference"),
            Backend::Accelerated(e) => {
                write!(f, "Backend::Accelerated({})", e.adapter_name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_never_panics() {
        // With or without a GPU present, detect() must hand back a backend.
        let backend = Backend::detect(32, 24);
        println!("{backend:?}");
    }
}
