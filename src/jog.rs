//! Keyboard jog state machine.
//!
//! Two modes: `Immediate`, where single keys nudge the servo, and
//! `NumericEntry`, where keys accumulate into an angle instruction submitted
//! with Enter. The machine only maps input to [`JogAction`]s; it never talks
//! to hardware, so it can be driven from a terminal, a script, or a test.

use std::fmt;

/// One key press, independent of the terminal library that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Char(char),
    Enter,
    Backspace,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JogMode {
    #[default]
    Immediate,
    NumericEntry,
}

/// Which of a position's three motion angles a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AngleSlot {
    FullAdvance,
    HalfAdvance,
    Retract,
}

impl AngleSlot {
    pub const ALL: [AngleSlot; 3] = [Self::FullAdvance, Self::HalfAdvance, Self::Retract];

    fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'f' => Some(Self::FullAdvance),
            'h' => Some(Self::HalfAdvance),
            'r' => Some(Self::Retract),
            _ => None,
        }
    }
}

impl fmt::Display for AngleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FullAdvance => "full advance",
            Self::HalfAdvance => "half advance",
            Self::Retract => "retract",
        })
    }
}

/// What the caller should do in response to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JogAction {
    /// Move by or to this instruction (see [`crate::angle::apply`]).
    Adjust(String),
    /// Store the current angle into a slot.
    Capture(AngleSlot),
    /// Move to the angle stored in a slot.
    Recall(AngleSlot),
    Help,
    Exit,
    /// The numeric entry buffer changed; carries its new contents.
    Entry(String),
    /// Bad key during numeric entry; the buffer was discarded.
    Invalid(char),
    /// Key has no meaning in the current mode.
    Ignored,
}

pub const HELP: &str = "\
Jog keys:
  .  ,   step +1 / -1 degree
  >  <   step +5 / -5 degrees
  o      return to origin (180)
  F H R  store current angle as full advance / half advance / retract
  f h r  move to the stored full advance / half advance / retract angle
  ?      this help
  e      exit
Type digits for an absolute angle, or start with + / - for a relative move,
then press Enter.";

#[derive(Debug, Clone, Default)]
pub struct JogMachine {
    mode: JogMode,
    buffer: String,
}

impl JogMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> JogMode {
        self.mode
    }

    /// Pending numeric entry.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one input event.
    pub fn handle(&mut self, event: InputEvent) -> JogAction {
        match event {
            InputEvent::Escape | InputEvent::Char('e' | 'E') => {
                self.reset();
                return JogAction::Exit;
            }
            InputEvent::Char('?') => return JogAction::Help,
            _ => {}
        }

        match self.mode {
            JogMode::Immediate => self.immediate(event),
            JogMode::NumericEntry => self.numeric(event),
        }
    }

    fn immediate(&mut self, event: InputEvent) -> JogAction {
        let InputEvent::Char(key) = event else {
            return JogAction::Ignored;
        };
        match key {
            '.' => JogAction::Adjust("+1".into()),
            ',' => JogAction::Adjust("-1".into()),
            '>' => JogAction::Adjust("+5".into()),
            '<' => JogAction::Adjust("-5".into()),
            'o' => JogAction::Adjust("180".into()),
            'F' | 'H' | 'R' => AngleSlot::from_key(key).map_or(JogAction::Ignored, JogAction::Capture),
            'f' | 'h' | 'r' => AngleSlot::from_key(key).map_or(JogAction::Ignored, JogAction::Recall),
            c if c.is_ascii_digit() || c == '+' || c == '-' => {
                self.mode = JogMode::NumericEntry;
                self.buffer.push(c);
                JogAction::Entry(self.buffer.clone())
            }
            _ => JogAction::Ignored,
        }
    }

    fn numeric(&mut self, event: InputEvent) -> JogAction {
        match event {
            InputEvent::Enter => {
                let instruction = std::mem::take(&mut self.buffer);
                self.mode = JogMode::Immediate;
                if instruction.is_empty() {
                    JogAction::Ignored
                } else {
                    JogAction::Adjust(instruction)
                }
            }
            InputEvent::Backspace => {
                self.buffer.pop();
                JogAction::Entry(self.buffer.clone())
            }
            InputEvent::Char(c) if c.is_ascii_digit() || ((c == '+' || c == '-') && self.buffer.is_empty()) => {
                self.buffer.push(c);
                JogAction::Entry(self.buffer.clone())
            }
            InputEvent::Char(c) => {
                self.reset();
                JogAction::Invalid(c)
            }
            InputEvent::Escape => {
                self.reset();
                JogAction::Exit
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.mode = JogMode::Immediate;
    }
}

#[cfg(feature = "terminal")]
impl InputEvent {
    /// Translate a crossterm key press. Releases and unmapped keys yield
    /// `None`; Ctrl-C maps to `Escape`.
    pub fn from_key_event(event: crossterm::event::KeyEvent) -> Option<Self> {
        use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

        if event.kind == KeyEventKind::Release {
            return None;
        }
        match event.code {
            KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Escape),
            KeyCode::Char(c) => Some(Self::Char(c)),
            KeyCode::Enter => Some(Self::Enter),
            KeyCode::Backspace => Some(Self::Backspace),
            KeyCode::Esc => Some(Self::Escape),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(machine: &mut JogMachine, keys: &str) -> Vec<JogAction> {
        keys.chars().map(|c| machine.handle(InputEvent::Char(c))).collect()
    }

    #[test]
    fn test_immediate_keys() {
        let mut machine = JogMachine::new();
        assert_eq!(
            feed(&mut machine, ".,><o"),
            vec![
                JogAction::Adjust("+1".into()),
                JogAction::Adjust("-1".into()),
                JogAction::Adjust("+5".into()),
                JogAction::Adjust("-5".into()),
                JogAction::Adjust("180".into()),
            ]
        );
        assert_eq!(machine.handle(InputEvent::Char('F')), JogAction::Capture(AngleSlot::FullAdvance));
        assert_eq!(machine.handle(InputEvent::Char('h')), JogAction::Recall(AngleSlot::HalfAdvance));
        assert_eq!(machine.handle(InputEvent::Char('R')), JogAction::Capture(AngleSlot::Retract));
        assert_eq!(machine.handle(InputEvent::Char('x')), JogAction::Ignored);
        assert_eq!(machine.handle(InputEvent::Enter), JogAction::Ignored);
        assert_eq!(machine.mode(), JogMode::Immediate);
    }

    #[test]
    fn test_numeric_entry_submits_on_enter() {
        let mut machine = JogMachine::new();
        feed(&mut machine, "-15");
        assert_eq!(machine.mode(), JogMode::NumericEntry);
        assert_eq!(machine.buffer(), "-15");

        assert_eq!(machine.handle(InputEvent::Enter), JogAction::Adjust("-15".into()));
        assert_eq!(machine.mode(), JogMode::Immediate);
        assert_eq!(machine.buffer(), "");
    }

    #[test]
    fn test_backspace_edits_buffer() {
        let mut machine = JogMachine::new();
        feed(&mut machine, "127");
        assert_eq!(machine.handle(InputEvent::Backspace), JogAction::Entry("12".into()));
        feed(&mut machine, "5");
        assert_eq!(machine.handle(InputEvent::Enter), JogAction::Adjust("125".into()));
    }

    #[test]
    fn test_sign_only_first() {
        let mut machine = JogMachine::new();
        feed(&mut machine, "12");
        assert_eq!(machine.handle(InputEvent::Char('+')), JogAction::Invalid('+'));
        assert_eq!(machine.mode(), JogMode::Immediate);
        assert_eq!(machine.buffer(), "");
    }

    #[test]
    fn test_immediate_keys_are_invalid_during_entry() {
        let mut machine = JogMachine::new();
        feed(&mut machine, "9");
        assert_eq!(machine.handle(InputEvent::Char('.')), JogAction::Invalid('.'));
        // Back in immediate mode, the same key jogs again.
        assert_eq!(machine.handle(InputEvent::Char('.')), JogAction::Adjust("+1".into()));
    }

    #[test]
    fn test_exit_and_help_work_in_both_modes() {
        let mut machine = JogMachine::new();
        assert_eq!(machine.handle(InputEvent::Char('?')), JogAction::Help);
        feed(&mut machine, "4");
        assert_eq!(machine.handle(InputEvent::Char('?')), JogAction::Help);
        assert_eq!(machine.buffer(), "4");
        assert_eq!(machine.handle(InputEvent::Char('E')), JogAction::Exit);
        assert_eq!(machine.buffer(), "");
        assert_eq!(machine.handle(InputEvent::Escape), JogAction::Exit);
    }

    #[test]
    fn test_empty_submit_is_ignored() {
        let mut machine = JogMachine::new();
        feed(&mut machine, "+");
        machine.handle(InputEvent::Backspace);
        assert_eq!(machine.handle(InputEvent::Enter), JogAction::Ignored);
        assert_eq!(machine.mode(), JogMode::Immediate);
    }

    #[cfg(feature = "terminal")]
    #[test]
    fn test_crossterm_translation() {
        use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(InputEvent::from_key_event(key(KeyCode::Char('.'))), Some(InputEvent::Char('.')));
        assert_eq!(InputEvent::from_key_event(key(KeyCode::Enter)), Some(InputEvent::Enter));
        assert_eq!(InputEvent::from_key_event(key(KeyCode::F(1))), None);
        assert_eq!(
            InputEvent::from_key_event(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(InputEvent::Escape)
        );
    }
}
