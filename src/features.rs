//! WebAssembly proposal feature flags.
//!
//! Every post-MVP construct is gated behind a feature. Decoding a gated
//! construct with its feature disabled reports
//! [`ErrorKind::FeatureDisabled`](crate::error::ErrorKind::FeatureDisabled)
//! at the construct's offset.
//!
//! Some proposals build on others, so the `enable_*` helpers cascade:
//! enabling exceptions enables reference types, which in turn enables bulk
//! memory. Flags can still be toggled individually through the public fields
//! for callers that want a non-standard combination.

use std::fmt;

/// Identifies a single proposal, for feature-gating diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    MutableGlobals,
    SaturatingFloatToInt,
    SignExtension,
    MultiValue,
    ReferenceTypes,
    BulkMemory,
    Simd,
    Threads,
    TailCall,
    Exceptions,
    MultiMemory,
}

impl Feature {
    /// The proposal's conventional flag name.
    pub fn name(self) -> &'static str {
        match self {
            Feature::MutableGlobals => "mutable-globals",
            Feature::SaturatingFloatToInt => "saturating-float-to-int",
            Feature::SignExtension => "sign-extension",
            Feature::MultiValue => "multi-value",
            Feature::ReferenceTypes => "reference-types",
            Feature::BulkMemory => "bulk-memory",
            Feature::Simd => "simd",
            Feature::Threads => "threads",
            Feature::TailCall => "tail-call",
            Feature::Exceptions => "exceptions",
            Feature::MultiMemory => "multi-memory",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The set of enabled proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub mutable_globals: bool,
    pub saturating_float_to_int: bool,
    pub sign_extension: bool,
    pub multi_value: bool,
    pub reference_types: bool,
    pub bulk_memory: bool,
    pub simd: bool,
    pub threads: bool,
    pub tail_call: bool,
    pub exceptions: bool,
    pub multi_memory: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features::mvp()
    }
}

impl Features {
    /// The MVP baseline: only mutable globals, which shipped with it.
    pub fn mvp() -> Self {
        Features {
            mutable_globals: true,
            saturating_float_to_int: false,
            sign_extension: false,
            multi_value: false,
            reference_types: false,
            bulk_memory: false,
            simd: false,
            threads: false,
            tail_call: false,
            exceptions: false,
            multi_memory: false,
        }
    }

    /// The WebAssembly 2.0 baseline: all proposals merged into the standard.
    pub fn wasm2() -> Self {
        Features {
            mutable_globals: true,
            saturating_float_to_int: true,
            sign_extension: true,
            multi_value: true,
            reference_types: true,
            bulk_memory: true,
            simd: true,
            threads: false,
            tail_call: false,
            exceptions: false,
            multi_memory: false,
        }
    }

    /// Every proposal this crate knows about.
    pub fn all() -> Self {
        Features {
            mutable_globals: true,
            saturating_float_to_int: true,
            sign_extension: true,
            multi_value: true,
            reference_types: true,
            bulk_memory: true,
            simd: true,
            threads: true,
            tail_call: true,
            exceptions: true,
            multi_memory: true,
        }
    }

    /// Whether a feature is enabled.
    pub fn has(&self, feature: Feature) -> bool {
        match feature {
            Feature::MutableGlobals => self.mutable_globals,
            Feature::SaturatingFloatToInt => self.saturating_float_to_int,
            Feature::SignExtension => self.sign_extension,
            Feature::MultiValue => self.multi_value,
            Feature::ReferenceTypes => self.reference_types,
            Feature::BulkMemory => self.bulk_memory,
            Feature::Simd => self.simd,
            Feature::Threads => self.threads,
            Feature::TailCall => self.tail_call,
            Feature::Exceptions => self.exceptions,
            Feature::MultiMemory => self.multi_memory,
        }
    }

    /// Enables bulk memory operations.
    pub fn enable_bulk_memory(mut self) -> Self {
        self.bulk_memory = true;
        self
    }

    /// Enables reference types; the proposal assumes bulk memory.
    pub fn enable_reference_types(mut self) -> Self {
        self.reference_types = true;
        self.enable_bulk_memory()
    }

    /// Enables exception handling; the proposal assumes reference types.
    pub fn enable_exceptions(mut self) -> Self {
        self.exceptions = true;
        self.enable_reference_types()
    }

    /// Enables threads and the shared-memory limits encoding.
    pub fn enable_threads(mut self) -> Self {
        self.threads = true;
        self
    }

    /// Enables the SIMD instruction set.
    pub fn enable_simd(mut self) -> Self {
        self.simd = true;
        self
    }

    /// Enables tail calls.
    pub fn enable_tail_call(mut self) -> Self {
        self.tail_call = true;
        self
    }

    /// Enables multiple memories.
    pub fn enable_multi_memory(mut self) -> Self {
        self.multi_memory = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mvp_is_default() {
        assert_eq!(Features::default(), Features::mvp());
        assert!(Features::mvp().mutable_globals);
        assert!(!Features::mvp().simd);
    }

    #[test]
    fn exceptions_cascade() {
        let f = Features::mvp().enable_exceptions();
        assert!(f.exceptions);
        assert!(f.reference_types);
        assert!(f.bulk_memory);
        assert!(!f.simd);
    }

    #[test]
    fn reference_types_cascade() {
        let f = Features::mvp().enable_reference_types();
        assert!(f.reference_types);
        assert!(f.bulk_memory);
        assert!(!f.exceptions);
    }

    #[test]
    fn has_matches_fields() {
        let f = Features::mvp().enable_simd();
        assert!(f.has(Feature::Simd));
        assert!(f.has(Feature::MutableGlobals));
        assert!(!f.has(Feature::Threads));
    }
}
