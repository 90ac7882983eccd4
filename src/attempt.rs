//! Quiz-taking state machine.
//!
//! An attempt is constructed once the quizzes of a theme have been
//! loaded, starts out answering, and moves to submitted only when every
//! question has an answer. Resetting clears the answers and returns to
//! answering; it never undoes an already saved progress record, a new
//! submission simply overwrites it through the update path.

use serde::{Deserialize, Serialize};

use crate::model::Quiz;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Answering,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("an attempt needs at least one quiz")]
    Empty,
    #[error("question {0} does not exist")]
    NoSuchQuestion(usize),
    #[error("option {0} does not exist")]
    NoSuchOption(usize),
    #[error("answers are frozen after submission")]
    AlreadySubmitted,
    #[error("{0} question(s) still unanswered")]
    Unanswered(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    quizzes: Vec<Quiz>,
    answers: Vec<Option<usize>>,
    phase: Phase,
}

impl QuizAttempt {
    pub fn new(quizzes: Vec<Quiz>) -> Result<Self, AttemptError> {
        if quizzes.is_empty() {
            return Err(AttemptError::Empty);
        }
        let answers = vec![None; quizzes.len()];
        Ok(Self {
            quizzes,
            answers,
            phase: Phase::Answering,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    pub fn total(&self) -> usize {
        self.quizzes.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn selected(&self, question: usize) -> Option<usize> {
        self.answers.get(question).copied().flatten()
    }

    /// Per-question result, `None` while the question is unanswered.
    pub fn is_correct(&self, question: usize) -> Option<bool> {
        let answer = self.selected(question)?;
        Some(answer == self.quizzes[question].correct_answer)
    }

    /// Record an answer. Re-selecting overwrites; the attempt stays in
    /// the answering phase.
    pub fn select(&mut self, question: usize, option: usize) -> Result<(), AttemptError> {
        if self.phase == Phase::Submitted {
            return Err(AttemptError::AlreadySubmitted);
        }
        let quiz = self
            .quizzes
            .get(question)
            .ok_or(AttemptError::NoSuchQuestion(question))?;
        if option >= quiz.options.len() {
            return Err(AttemptError::NoSuchOption(option));
        }
        self.answers[question] = Some(option);
        Ok(())
    }

    /// Submit the attempt. Fails while any question is unanswered,
    /// otherwise freezes the answers and returns the score.
    pub fn submit(&mut self) -> Result<u8, AttemptError> {
        if self.phase == Phase::Submitted {
            return Err(AttemptError::AlreadySubmitted);
        }
        let unanswered = self.total() - self.answered_count();
        if unanswered > 0 {
            return Err(AttemptError::Unanswered(unanswered));
        }
        self.phase = Phase::Submitted;
        Ok(self.score().expect("submitted attempt has a score"))
    }

    fn correct_count(&self) -> usize {
        (0..self.total())
            .filter(|&i| self.is_correct(i) == Some(true))
            .count()
    }

    /// `round(100 * correct / total)`, available once submitted.
    pub fn score(&self) -> Option<u8> {
        if self.phase != Phase::Submitted {
            return None;
        }
        let score = 100.0 * self.correct_count() as f64 / self.total() as f64;
        Some(score.round() as u8)
    }

    /// Start over: cleared answers, back to answering.
    pub fn reset(&mut self) {
        self.answers = vec![None; self.quizzes.len()];
        self.phase = Phase::Answering;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now;

    fn quiz(id: &str, correct: usize) -> Quiz {
        Quiz {
            id: id.into(),
            theme_id: "theme-rika-002".into(),
            question: format!("問題 {id}"),
            options: vec!["あ".into(), "い".into(), "う".into(), "え".into()],
            correct_answer: correct,
            order: 1,
            created_at: now(),
        }
    }

    fn attempt() -> QuizAttempt {
        QuizAttempt::new(vec![quiz("q1", 1), quiz("q2", 2), quiz("q3", 0)]).unwrap()
    }

    #[test]
    fn rejects_empty_quiz_list() {
        assert_eq!(QuizAttempt::new(vec![]).unwrap_err(), AttemptError::Empty);
    }

    #[test]
    fn submit_blocked_until_all_answered() {
        let mut attempt = attempt();
        attempt.select(0, 1).unwrap();
        attempt.select(1, 2).unwrap();
        assert_eq!(attempt.submit().unwrap_err(), AttemptError::Unanswered(1));
        assert_eq!(attempt.phase(), Phase::Answering);
        attempt.select(2, 0).unwrap();
        assert_eq!(attempt.submit().unwrap(), 100);
        assert_eq!(attempt.phase(), Phase::Submitted);
    }

    #[test]
    fn two_of_three_scores_67() {
        let mut attempt = attempt();
        attempt.select(0, 1).unwrap();
        attempt.select(1, 2).unwrap();
        attempt.select(2, 3).unwrap(); // wrong
        assert_eq!(attempt.submit().unwrap(), 67);
    }

    #[test]
    fn selection_overwrites_and_shows_per_question_result() {
        let mut attempt = attempt();
        assert_eq!(attempt.is_correct(0), None);
        attempt.select(0, 3).unwrap();
        assert_eq!(attempt.is_correct(0), Some(false));
        attempt.select(0, 1).unwrap();
        assert_eq!(attempt.is_correct(0), Some(true));
        assert_eq!(attempt.answered_count(), 1);
        assert_eq!(attempt.phase(), Phase::Answering);
    }

    #[test]
    fn answers_frozen_after_submit() {
        let mut attempt = attempt();
        for i in 0..3 {
            attempt.select(i, 0).unwrap();
        }
        attempt.submit().unwrap();
        assert_eq!(
            attempt.select(0, 1).unwrap_err(),
            AttemptError::AlreadySubmitted
        );
        assert_eq!(attempt.submit().unwrap_err(), AttemptError::AlreadySubmitted);
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        let mut attempt = attempt();
        assert_eq!(
            attempt.select(9, 0).unwrap_err(),
            AttemptError::NoSuchQuestion(9)
        );
        assert_eq!(
            attempt.select(0, 9).unwrap_err(),
            AttemptError::NoSuchOption(9)
        );
    }

    #[test]
    fn reset_returns_to_answering_with_cleared_answers() {
        let mut attempt = attempt();
        for i in 0..3 {
            attempt.select(i, 1).unwrap();
        }
        attempt.submit().unwrap();
        attempt.reset();
        assert_eq!(attempt.phase(), Phase::Answering);
        assert_eq!(attempt.answered_count(), 0);
        assert_eq!(attempt.score(), None);
    }
}
