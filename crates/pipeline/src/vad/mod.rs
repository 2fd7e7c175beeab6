pub mod energy;

pub use energy::{EnergyVad, rms_energy};

/// Transition reported after classifying a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// Still silent.
    Silence,
    /// First loud chunk after silence.
    SpeechStart,
    /// Still speaking, including quiet chunks inside the silence window.
    Speaking,
    /// Silence outlasted the threshold after speech.
    SpeechEnd,
}

impl VadTransition {
    pub fn from_states(was_speaking: bool, is_speaking: bool) -> Self {
        match (was_speaking, is_speaking) {
            (false, false) => VadTransition::Silence,
            (false, true) => VadTransition::SpeechStart,
            (true, true) => VadTransition::Speaking,
            (true, false) => VadTransition::SpeechEnd,
        }
    }
}
