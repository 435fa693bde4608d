use crossbeam_channel::{unbounded, Receiver, Sender};
use super::PipelineMessage;

/// MessageBus funnels UI, MIDI and timer input into the thread that owns the pipeline
pub struct MessageBus {
    sender: Sender<PipelineMessage>,
    receiver: Receiver<PipelineMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        MessageBus { sender, receiver }
    }

    /// Get a sender that can be cloned and handed to input sources
    pub fn sender(&self) -> Sender<PipelineMessage> {
        self.sender.clone()
    }

    pub fn try_receive(&self) -> Result<PipelineMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn send(&self, msg: PipelineMessage) -> Result<(), crossbeam_channel::SendError<PipelineMessage>> {
        self.sender.send(msg)
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_from_any_sender_arrive_in_order() {
        let bus = MessageBus::new();
        let midi = bus.sender();
        bus.send(PipelineMessage::ClearProgression).unwrap();
        midi.send(PipelineMessage::MidiDevicesChanged).unwrap();

        assert!(matches!(bus.try_receive(), Ok(PipelineMessage::ClearProgression)));
        assert!(matches!(bus.try_receive(), Ok(PipelineMessage::MidiDevicesChanged)));
        assert!(bus.is_empty());
        assert!(bus.try_receive().is_err());
    }
}
