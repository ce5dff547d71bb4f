pub mod change_gate;
pub mod frame;
pub mod frame_slot;

pub use change_gate::ChangeGate;
pub use frame::{Frame, GrayFrame, RawFrame};
pub use frame_slot::{FrameSlot, FrameSource};
