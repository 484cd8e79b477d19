use super::BpmnBehaviors;
use crate::intent::SignalIntent;
use crate::record::SignalRecord;

impl BpmnBehaviors<'_> {
    /// Broadcasts a signal to every waiting catch event of the partition.
    pub fn broadcast_signal(&mut self, signal_name: &str, variables: Vec<u8>) {
        self.new_command(
            SignalIntent::Broadcast,
            SignalRecord {
                signal_name: signal_name.to_string(),
                variables,
            },
        );
    }
}
