// ============================================================================
// Aggregate Root Pattern
// ============================================================================
//
// 1. Commands are validated against current state before anything changes
// 2. Validated commands produce events
// 3. Events are applied to mutate state
// 4. The store persists the resulting snapshot under an expected version
//
// ============================================================================

/// Generic aggregate trait implemented by every domain aggregate.
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Apply an event to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic, no mutation)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Validate a command and apply the resulting events in one step.
    ///
    /// State is only touched once the command has been accepted, so a rejected
    /// command leaves the aggregate exactly as it was.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(command)?;
        for event in &events {
            self.apply_event(event)?;
        }
        Ok(events)
    }
}
