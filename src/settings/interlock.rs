//! Rules that keep the network toggles coherent.
//!
//! "Don't serve requests" dominates: while it is on, automatic IP detection and
//! random port selection are off and cannot be switched on, and the host
//! fields are open for manual entry. Otherwise each auto toggle owns its field.

use super::{Derived, SettingsState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    DontServe,
    AutoDetectIp,
    RandomPort,
    ExpertMode,
}

/// Field that should receive input focus after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    HostIp,
    HostPort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SettingsState,
    pub derived: Derived,
    pub focus: Option<Focus>,
}

/// Compute the state after flipping `toggle` to `value`.
pub fn apply(current: &SettingsState, toggle: Toggle, value: bool) -> Transition {
    let mut state = current.clone();
    let mut focus = None;

    match toggle {
        Toggle::DontServe if value => {
            force_manual(&mut state);
            focus = Some(Focus::HostIp);
        }
        // Already serving: the manual setup stays as it is
        Toggle::DontServe if !state.dont_serve => {}
        Toggle::DontServe => {
            state.dont_serve = false;
            state.auto_detect_ip = true;
            state.random_port = true;
        }
        // Disabled toggles: nothing to do
        Toggle::AutoDetectIp | Toggle::RandomPort if state.dont_serve => {}
        Toggle::AutoDetectIp => {
            state.auto_detect_ip = value;
            if !value {
                focus = Some(Focus::HostIp);
            }
        }
        Toggle::RandomPort => {
            state.random_port = value;
            if !value {
                focus = Some(Focus::HostPort);
            }
        }
        Toggle::ExpertMode => state.expert_mode = value,
    }

    let derived = Derived::of(&state);
    Transition {
        state,
        derived,
        focus,
    }
}

/// Resolve a freshly loaded state.
///
/// A persisted "don't serve" overrides whatever was stored for the two auto
/// toggles. When it is off the stored toggles are taken as they are.
pub fn on_load(mut state: SettingsState) -> SettingsState {
    if state.dont_serve {
        force_manual(&mut state);
    }
    state
}

fn force_manual(state: &mut SettingsState) {
    state.dont_serve = true;
    state.auto_detect_ip = false;
    state.random_port = false;
}
