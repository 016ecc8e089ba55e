//! Effect interpreter shared by the action pipeline and the scheduler
//!
//! Applies one effect to the state store. Failure policy differs by kind:
//! set_var, modify_var, set_entity, trigger_event, and message degrade to a
//! skipped outcome on bad input so rule and tick processing stay resilient;
//! update_score, add_log, add_event, and set_status surface an explicit
//! error. The action processor stops an effect list on the first explicit
//! error; the scheduler reports it and keeps going.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::EffectError;
use crate::model::Effect;
use crate::state::SimulationState;

/// What applying a single effect did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EffectOutcome {
    Applied {
        effect: &'static str,
    },
    Skipped {
        effect: &'static str,
        reason: &'static str,
    },
}

/// Apply one effect to the state store
pub fn apply(effect: &Effect, state: &mut SimulationState) -> Result<EffectOutcome, EffectError> {
    match effect {
        Effect::SetVar { target, value } => {
            // a missing or non-numeric value falls through to the store's
            // NaN handling, which restores the variable's initial value
            let amount = value.as_ref().and_then(Value::as_f64).unwrap_or(f64::NAN);
            if state.set_variable(target, amount) {
                Ok(EffectOutcome::Applied { effect: "set_var" })
            } else {
                Ok(EffectOutcome::Skipped {
                    effect: "set_var",
                    reason: "unknown variable",
                })
            }
        }

        Effect::ModifyVar {
            target,
            operation,
            value,
        } => {
            let amount = value.as_ref().and_then(Value::as_f64).unwrap_or(f64::NAN);
            if state.modify_variable(target, *operation, amount) {
                Ok(EffectOutcome::Applied {
                    effect: "modify_var",
                })
            } else {
                Ok(EffectOutcome::Skipped {
                    effect: "modify_var",
                    reason: "unknown variable or operation",
                })
            }
        }

        Effect::SetEntity { target, value } => match value {
            Some(Value::Object(properties)) => {
                for (key, value) in properties {
                    state.set_entity_property(target, key, value.clone());
                }
                Ok(EffectOutcome::Applied {
                    effect: "set_entity",
                })
            }
            _ => Ok(EffectOutcome::Skipped {
                effect: "set_entity",
                reason: "value is not an object",
            }),
        },

        Effect::TriggerEvent { target } => {
            tracing::info!(
                target_event = target.as_deref().unwrap_or("unknown"),
                "event triggered"
            );
            Ok(EffectOutcome::Applied {
                effect: "trigger_event",
            })
        }

        Effect::Message { message } => {
            tracing::info!(%message, "game message");
            Ok(EffectOutcome::Applied { effect: "message" })
        }

        Effect::UpdateScore { player_id, value } => {
            let Some(score) = value.as_ref().and_then(Value::as_f64) else {
                return Err(EffectError::ScoreValue {
                    player_id: player_id.clone(),
                });
            };
            state.update_score(player_id, score);
            Ok(EffectOutcome::Applied {
                effect: "update_score",
            })
        }

        Effect::AddLog { message } => {
            state.add_log(message.clone());
            Ok(EffectOutcome::Applied { effect: "add_log" })
        }

        Effect::AddEvent {
            event_type,
            message,
        } => {
            let Some(message) = message else {
                return Err(EffectError::EventMessage {
                    event_type: event_type.clone(),
                });
            };
            state.add_event(event_type.clone(), message.clone());
            Ok(EffectOutcome::Applied {
                effect: "add_event",
            })
        }

        Effect::SetStatus { status } => {
            state.set_status(*status);
            Ok(EffectOutcome::Applied {
                effect: "set_status",
            })
        }
    }
}
