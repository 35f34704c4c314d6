//! Compiled-in quizzes used when neither the remote source nor the cache
//! has ever produced a collection. Never written back to the cache.

use crate::models::{Question, Quiz, QuizCollection};

struct SeedQuestion {
    text: &'static str,
    answers: &'static [&'static str],
    correct: usize,
}

struct SeedQuiz {
    title: &'static str,
    description: &'static str,
    icon: &'static str,
    questions: &'static [SeedQuestion],
}

const SEED_QUIZZES: &[SeedQuiz] = &[
    SeedQuiz {
        title: "Mathematics",
        description: "Test your math skills",
        icon: "🔢",
        questions: &[
            SeedQuestion {
                text: "What is 2 + 2?",
                answers: &["3", "4", "5", "6"],
                correct: 1,
            },
            SeedQuestion {
                text: "What is 5 × 3?",
                answers: &["10", "15", "20", "25"],
                correct: 1,
            },
            SeedQuestion {
                text: "What is 10 ÷ 2?",
                answers: &["3", "4", "5", "6"],
                correct: 2,
            },
        ],
    },
    SeedQuiz {
        title: "Marvel Super Heroes",
        description: "Test your Marvel knowledge",
        icon: "🦸",
        questions: &[
            SeedQuestion {
                text: "What is Iron Man's real name?",
                answers: &["Steve Rogers", "Tony Stark", "Bruce Banner", "Peter Parker"],
                correct: 1,
            },
            SeedQuestion {
                text: "What is Captain America's shield made of?",
                answers: &["Steel", "Vibranium", "Adamantium", "Titanium"],
                correct: 1,
            },
            SeedQuestion {
                text: "Who is the God of Thunder?",
                answers: &["Loki", "Thor", "Odin", "Hela"],
                correct: 1,
            },
        ],
    },
    SeedQuiz {
        title: "Science",
        description: "Test your science knowledge",
        icon: "🔬",
        questions: &[
            SeedQuestion {
                text: "What is the chemical symbol for water?",
                answers: &["H2O", "CO2", "O2", "NaCl"],
                correct: 0,
            },
            SeedQuestion {
                text: "What planet is known as the Red Planet?",
                answers: &["Venus", "Mars", "Jupiter", "Saturn"],
                correct: 1,
            },
            SeedQuestion {
                text: "What is the speed of light?",
                answers: &["300,000 km/s", "150,000 km/s", "450,000 km/s", "600,000 km/s"],
                correct: 0,
            },
        ],
    },
];

/// Build the seed collection.
pub fn seed_quizzes() -> QuizCollection {
    SEED_QUIZZES
        .iter()
        .map(|quiz| {
            let questions = quiz
                .questions
                .iter()
                .map(|q| {
                    Question::new(
                        q.text,
                        q.answers.iter().map(|a| a.to_string()).collect(),
                        q.correct,
                    )
                })
                .collect();
            Quiz::new(quiz.title, quiz.description, quiz.icon, questions)
        })
        .collect()
}
