// Delivery lifecycle state machine.
//
// The only writer of the delivery status and outcome fields. Status moves
// pending_csv -> ready_to_send -> sending -> sent | failed (failed ->
// sending retries); the outcome is an orthogonal post-send annotation.
// Every transition is guarded by an optimistic precondition against the
// persisted status to avoid lost updates under concurrent retries.

pub mod delivery_state_machine;
pub mod errors;
pub mod events;

pub use delivery_state_machine::{determine_target_state, DeliveryStateMachine, OutcomeApplication};
pub use errors::{StateMachineError, StateMachineResult};
pub use events::DeliveryEvent;
