//! Server-rendered pages: subject/theme browsing and the quiz flow.
//!
//! The quiz pages drive a session-held [`QuizAttempt`]; submitting
//! persists progress through the same store path as the REST endpoints,
//! falling through to the update call when a record already exists.

use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use pulldown_cmark::{Parser, html::push_html};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    api::AppState,
    attempt::{AttemptError, Phase, QuizAttempt},
    auth::current_user,
    error::ApiError,
    model::{Grade, Subject, Theme},
    store::{NewProgress, ProgressUpdate, StoreError, ThemeFilter},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/subjects/{subject}", get(subject_page))
        .route("/themes/{id}", get(theme_page))
        .route("/quiz/{theme_id}", get(quiz_page))
        .route("/quiz/{theme_id}/answer", post(answer))
        .route("/quiz/{theme_id}/submit", post(submit))
        .route("/quiz/{theme_id}/reset", post(reset))
        .with_state(state)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} | まなびや</title>\n</head>\n<body>\n\
         <header><a href=\"/\">まなびや</a></header>\n\
         <main>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
    ))
}

fn html_not_found(title: &str, message: &str) -> Response {
    let body = format!(
        "<h1>{}</h1>\n<p>{}</p>\n<p><a href=\"/\">トップに戻る</a></p>",
        escape(title),
        escape(message)
    );
    (StatusCode::NOT_FOUND, layout(title, &body)).into_response()
}

fn attempt_key(theme_id: &str) -> String {
    format!("attempt:{theme_id}")
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let themes = state.store.themes(ThemeFilter::default()).await?;
    let mut body = String::from("<h1>きょうのテーマをえらぼう</h1>\n");
    for subject in Subject::ALL {
        body.push_str(&format!(
            "<section>\n<h2><a href=\"/subjects/{id}\">{label}</a></h2>\n<ul>\n",
            id = subject.as_str(),
            label = subject.label(),
        ));
        for theme in themes.iter().filter(|t| t.subject == subject) {
            body.push_str(&format!(
                "<li><a href=\"/themes/{id}\">{title}</a>（{grade}年生）</li>\n",
                id = escape(&theme.id),
                title = escape(&theme.title),
                grade = theme.grade,
            ));
        }
        body.push_str("</ul>\n</section>\n");
    }
    Ok(layout("ホーム", &body))
}

#[derive(Debug, Deserialize)]
struct SubjectQuery {
    grade: Option<String>,
}

async fn subject_page(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Query(query): Query<SubjectQuery>,
) -> Result<Response, ApiError> {
    let Some(subject) = Subject::parse(&subject) else {
        return Ok(html_not_found(
            "科目が見つかりません",
            "そのような科目はありません",
        ));
    };
    let grade = query
        .grade
        .as_deref()
        .and_then(|g| g.parse::<u8>().ok())
        .and_then(|n| Grade::try_from(n).ok());
    let themes = state
        .store
        .themes(ThemeFilter {
            subject: Some(subject),
            grade,
        })
        .await?;
    let mut body = format!("<h1>{}</h1>\n<nav>学年: ", subject.label());
    for g in Grade::ALL {
        body.push_str(&format!(
            "<a href=\"/subjects/{id}?grade={g}\">{g}年生</a> ",
            id = subject.as_str(),
        ));
    }
    body.push_str(&format!(
        "<a href=\"/subjects/{id}\">すべて</a></nav>\n<ul>\n",
        id = subject.as_str()
    ));
    for theme in &themes {
        body.push_str(&format!(
            "<li><a href=\"/themes/{id}\">{title}</a>（{grade}年生）",
            id = escape(&theme.id),
            title = escape(&theme.title),
            grade = theme.grade,
        ));
        if let Some(description) = &theme.description {
            body.push_str(&format!("<br>{}", escape(description)));
        }
        body.push_str("</li>\n");
    }
    if themes.is_empty() {
        body.push_str("<li>テーマはまだ登録されていません</li>\n");
    }
    body.push_str("</ul>\n");
    Ok(layout(subject.label(), &body).into_response())
}

fn render_markdown(markdown: &str) -> String {
    let mut html = String::new();
    push_html(&mut html, Parser::new(markdown));
    html
}

async fn theme_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(theme) = state.store.theme(&id).await? else {
        return Ok(html_not_found(
            "テーマが見つかりません",
            &format!("ID: {id} のテーマは存在しません"),
        ));
    };
    let has_quiz = !state.store.quizzes_by_theme(&theme.id).await?.is_empty();
    let mut body = format!(
        "<p><a href=\"/subjects/{subject}\">{label}</a> / {grade}年生</p>\n",
        subject = theme.subject.as_str(),
        label = theme.subject.label(),
        grade = theme.grade,
    );
    match &theme.content {
        Some(content) => body.push_str(&render_markdown(content)),
        None => body.push_str(&format!("<h1>{}</h1>\n", escape(&theme.title))),
    }
    if let Some(video_url) = &theme.video_url {
        body.push_str(&format!(
            "<p><a href=\"{}\">動画を見る</a></p>\n",
            escape(video_url)
        ));
    }
    if has_quiz {
        body.push_str(&format!(
            "<p><a href=\"/quiz/{}\">クイズに挑戦する</a></p>\n",
            escape(&theme.id)
        ));
    }
    Ok(layout(&theme.title, &body).into_response())
}

#[derive(Debug, Deserialize)]
struct QuizPageQuery {
    notice: Option<String>,
    saved: Option<String>,
}

fn render_answering(theme: &Theme, attempt: &QuizAttempt, notice: bool) -> String {
    let mut body = format!(
        "<h1>{}</h1>\n<p>全{}問のクイズに挑戦しよう！</p>\n\
         <p>回答状況: {} / {}問</p>\n",
        escape(&theme.title),
        attempt.total(),
        attempt.answered_count(),
        attempt.total(),
    );
    if notice {
        body.push_str("<p><strong>全ての問題に回答してください</strong></p>\n");
    }
    for (i, quiz) in attempt.quizzes().iter().enumerate() {
        body.push_str(&format!(
            "<section>\n<h2>Q{}. {}</h2>\n",
            i + 1,
            escape(&quiz.question)
        ));
        for (j, option) in quiz.options.iter().enumerate() {
            let marker = if attempt.selected(i) == Some(j) {
                " ✔"
            } else {
                ""
            };
            body.push_str(&format!(
                "<form method=\"post\" action=\"/quiz/{theme_id}/answer\">\n\
                 <input type=\"hidden\" name=\"question\" value=\"{i}\">\n\
                 <input type=\"hidden\" name=\"option\" value=\"{j}\">\n\
                 <button type=\"submit\">{option}{marker}</button>\n</form>\n",
                theme_id = escape(&theme.id),
                option = escape(option),
            ));
        }
        body.push_str("</section>\n");
    }
    if attempt.answered_count() == attempt.total() {
        body.push_str(&format!(
            "<form method=\"post\" action=\"/quiz/{}/submit\">\n\
             <button type=\"submit\">結果を見る</button>\n</form>\n",
            escape(&theme.id)
        ));
    }
    body
}

fn render_results(theme: &Theme, attempt: &QuizAttempt, saved: bool) -> String {
    let score = attempt.score().unwrap_or(0);
    let correct = attempt
        .quizzes()
        .iter()
        .enumerate()
        .filter(|(i, _)| attempt.is_correct(*i) == Some(true))
        .count();
    let mut body = format!(
        "<h1>クイズ結果</h1>\n<p><strong>{score}点</strong></p>\n\
         <p>{total}問中 {correct}問正解！</p>\n",
        total = attempt.total(),
    );
    if saved {
        body.push_str("<p>進捗を保存しました</p>\n");
    }
    for (i, quiz) in attempt.quizzes().iter().enumerate() {
        let verdict = if attempt.is_correct(i) == Some(true) {
            "正解"
        } else {
            "不正解"
        };
        let correct_option = &quiz.options[quiz.correct_answer];
        body.push_str(&format!(
            "<section>\n<h2>Q{}. {}</h2>\n<p>{verdict}（正解: {}）</p>\n</section>\n",
            i + 1,
            escape(&quiz.question),
            escape(correct_option),
        ));
    }
    body.push_str(&format!(
        "<form method=\"post\" action=\"/quiz/{id}/reset\">\n\
         <button type=\"submit\">もう一度挑戦</button>\n</form>\n\
         <p><a href=\"/themes/{id}\">テーマに戻る</a> <a href=\"/\">トップに戻る</a></p>\n",
        id = escape(&theme.id),
    ));
    body
}

async fn quiz_page(
    State(state): State<AppState>,
    session: Session,
    Path(theme_id): Path<String>,
    Query(query): Query<QuizPageQuery>,
) -> Result<Response, ApiError> {
    let Some(theme) = state.store.theme(&theme_id).await? else {
        return Ok(html_not_found(
            "テーマが見つかりません",
            &format!("ID: {theme_id} のテーマは存在しません"),
        ));
    };
    let attempt = match session.get::<QuizAttempt>(&attempt_key(&theme_id)).await? {
        Some(attempt) => attempt,
        None => {
            let quizzes = state.store.quizzes_by_theme(&theme_id).await?;
            match QuizAttempt::new(quizzes) {
                Ok(attempt) => {
                    session
                        .insert(&attempt_key(&theme_id), attempt.clone())
                        .await?;
                    attempt
                }
                Err(AttemptError::Empty) => {
                    return Ok(html_not_found(
                        "クイズが見つかりません",
                        "このテーマにはまだクイズが登録されていません",
                    ));
                }
                Err(e) => return Err(ApiError::Internal(anyhow::Error::new(e))),
            }
        }
    };
    let body = match attempt.phase() {
        Phase::Answering => render_answering(
            &theme,
            &attempt,
            query.notice.as_deref() == Some("unanswered"),
        ),
        Phase::Submitted => {
            render_results(&theme, &attempt, query.saved.as_deref() == Some("1"))
        }
    };
    Ok(layout(&theme.title, &body).into_response())
}

#[derive(Debug, Deserialize)]
struct AnswerForm {
    question: usize,
    option: usize,
}

async fn answer(
    session: Session,
    Path(theme_id): Path<String>,
    Form(form): Form<AnswerForm>,
) -> Result<Redirect, ApiError> {
    let back = format!("/quiz/{theme_id}");
    let Some(mut attempt) = session.get::<QuizAttempt>(&attempt_key(&theme_id)).await? else {
        return Ok(Redirect::to(&back));
    };
    // out-of-range or post-submit selections are dropped, the page
    // simply re-renders
    if attempt.select(form.question, form.option).is_ok() {
        session.insert(&attempt_key(&theme_id), attempt).await?;
    }
    Ok(Redirect::to(&back))
}

async fn submit(
    State(state): State<AppState>,
    session: Session,
    Path(theme_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let back = format!("/quiz/{theme_id}");
    let Some(mut attempt) = session.get::<QuizAttempt>(&attempt_key(&theme_id)).await? else {
        return Ok(Redirect::to(&back));
    };
    let score = match attempt.submit() {
        Ok(score) => score,
        Err(AttemptError::Unanswered(_)) => {
            return Ok(Redirect::to(&format!("{back}?notice=unanswered")));
        }
        Err(_) => return Ok(Redirect::to(&back)),
    };
    session
        .insert(&attempt_key(&theme_id), attempt.clone())
        .await?;

    // progress is only saved for a logged-in user; the result page
    // still shows the score either way
    let Ok(user) = current_user(&session).await else {
        return Ok(Redirect::to(&back));
    };
    let saved = save_progress(&state, &user.id, &theme_id, score).await;
    if let Err(e) = &saved {
        tracing::error!(error = ?e, "failed to save quiz progress");
    }
    let target = if saved.is_ok() {
        format!("{back}?saved=1")
    } else {
        back
    };
    Ok(Redirect::to(&target))
}

async fn save_progress(
    state: &AppState,
    user_id: &str,
    theme_id: &str,
    score: u8,
) -> Result<(), StoreError> {
    let insert = state
        .store
        .insert_progress(NewProgress {
            user_id: user_id.to_owned(),
            theme_id: theme_id.to_owned(),
            completed: true,
            quiz_score: Some(f64::from(score)),
        })
        .await;
    match insert {
        Ok(_) => Ok(()),
        Err(StoreError::DuplicateProgress) => {
            state
                .store
                .update_progress(ProgressUpdate {
                    user_id: user_id.to_owned(),
                    theme_id: theme_id.to_owned(),
                    completed: true,
                    quiz_score: Some(f64::from(score)),
                })
                .await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn reset(
    session: Session,
    Path(theme_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let back = format!("/quiz/{theme_id}");
    if let Some(mut attempt) = session.get::<QuizAttempt>(&attempt_key(&theme_id)).await? {
        attempt.reset();
        session.insert(&attempt_key(&theme_id), attempt).await?;
    }
    Ok(Redirect::to(&back))
}
