use std::cell::RefCell;
use std::collections::VecDeque;

/// Operator interaction. Implementations never fail: when no answer can be
/// obtained they return the default.
pub trait Prompter {
    fn confirm(&self, prompt: &str, default: bool) -> bool;

    /// Index into `items`.
    fn select(&self, prompt: &str, items: &[String], default: usize) -> usize;

    fn input(&self, prompt: &str, default: &str) -> String;
}

/// Every prompt takes its default. Backs `--yes` and non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeDefaults;

impl Prompter for AssumeDefaults {
    fn confirm(&self, _prompt: &str, default: bool) -> bool {
        default
    }

    fn select(&self, _prompt: &str, _items: &[String], default: usize) -> usize {
        default
    }

    fn input(&self, _prompt: &str, default: &str) -> String {
        default.to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(bool),
    Select(usize),
    Input(String),
}

/// Replays queued answers in order. A prompt whose queued answer has the
/// wrong kind, or that finds the queue empty, gets its default.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<Answer>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Prompts shown so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    fn next(&self, prompt: &str) -> Option<Answer> {
        self.asked.borrow_mut().push(prompt.to_owned());
        self.answers.borrow_mut().pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        match self.next(prompt) {
            Some(Answer::Confirm(v)) => v,
            _ => default,
        }
    }

    fn select(&self, prompt: &str, items: &[String], default: usize) -> usize {
        match self.next(prompt) {
            Some(Answer::Select(i)) if i < items.len() => i,
            _ => default,
        }
    }

    fn input(&self, prompt: &str, default: &str) -> String {
        match self.next(prompt) {
            Some(Answer::Input(s)) => s,
            _ => default.to_owned(),
        }
    }
}
