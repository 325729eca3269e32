use crate::detect::DetectorKind;

/// Knobs for a scan
#[derive(Clone, Debug)]
pub struct Settings {
    /// Detectors to run over every method
    pub detectors: Vec<DetectorKind>,

    /// Methods with more instructions than this are reported as incomplete instead of analysed
    pub max_instructions_per_method: Option<usize>,

    /// Carry a receiver's tag over to the value returned by calls on it
    ///
    /// This lets `new StringBuilder().append("a").append("b")` be recognized as one chain, but it
    /// also assumes every call returning the receiver's type returns something related to it.
    pub propagate_call_chains: bool,

    /// Merge the stack and locals of paths that join back up (eg. the arms of `c ? a : b`)
    ///
    /// With this off, the simulation just carries the fall-through state forward.
    pub ternary_normalization: bool,

    /// Number of leading package segments two classes must share to be considered related
    ///
    /// Used to decide whether a class has any business parsing another class' `toString()`.
    pub similar_package_depth: usize,
}

impl Settings {
    pub const DEFAULT_SIMILAR_PACKAGE_DEPTH: usize = 2;

    /// Settings running only the given detectors
    pub fn with_detectors(detectors: Vec<DetectorKind>) -> Settings {
        Settings {
            detectors,
            ..Settings::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            detectors: DetectorKind::ALL.to_vec(),
            max_instructions_per_method: None,
            propagate_call_chains: true,
            ternary_normalization: true,
            similar_package_depth: Settings::DEFAULT_SIMILAR_PACKAGE_DEPTH,
        }
    }
}
