//! songhelix song document library.
//!
//! A song document is a declarative JSON description of a generated song:
//! its temporal structure, its harmony engine, its arrangement (activity
//! solver plus instrument tracks), and its player. This crate provides the
//! serde types, cross-reference validation, the numeric/string random
//! templating, the version gate, and deterministic seed derivation.
//!
//! # Modules
//!
//! - [`song`]: the root document and structure
//! - [`harmony`]: harmony engine configuration
//! - [`patterns`]: pattern engine configuration
//! - [`arrangement`]: activity solver and track configuration
//! - [`sequencers`]: sequence engine configuration
//! - [`player`]: device, tempo, LFO, and synchronization configuration
//! - [`random`]: templated numeric and string values
//! - [`seed`]: blake3-based seed derivation
//! - [`version`]: document version ranges

pub mod arrangement;
pub mod error;
pub mod harmony;
pub mod patterns;
pub mod player;
pub mod random;
pub mod seed;
pub mod sequencers;
pub mod song;
pub mod version;

pub use arrangement::{
    ActivityModifierSpec, ActivityVectorSpec, ArrangementSpec, ConstraintMode, GreedyWeights,
    SectionRef, TrackKindSpec, TrackSpec,
};
pub use error::SpecError;
pub use harmony::{ChordPatternSpec, HarmonySpec};
pub use patterns::{
    CrescendoSpec, PatternEngineSpec, PatternSource, RandomFragmentSpec, RandomPatternSpec,
    WeightedChoice,
};
pub use player::{
    DeviceChannelSpec, DeviceSpec, LegatoControllerSpec, LfoShape, LfoSpec, MidiPlayerSpec,
    PlayerSpec, RotationUnit, SyncSpec,
};
pub use random::{RandomKind, RandomString, RandomValue};
pub use seed::{derive_seed, rng_for};
pub use sequencers::{
    ArpeggioSpec, ConditionalMode, ConditionalPatternSpec, DrumSpec, DrumVoiceSpec, MelodySpec,
    PadSpec, PatternRestartMode, PatternSeqSpec, SequenceEngineSpec,
};
pub use song::{SongDocument, StructureSpec};
pub use version::{check_version, SUPPORTED_VERSION};
