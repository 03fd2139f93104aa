//! Field rules for user documents. Every check reports a human-readable
//! problem; callers join them into one validation error.

use serde::Deserialize;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Signup body as submitted. Fields are optional so missing ones are
/// reported alongside the other problems instead of as a parse error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

impl NewUserInput {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut problems = Vec::new();
        name_problems(self.name.as_deref(), &mut problems);
        email_problems(self.email.as_deref(), &mut problems);
        password_problems(
            self.password.as_deref(),
            self.password_confirm.as_deref(),
            &mut problems,
        );
        into_result(&problems)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn name_problems(name: Option<&str>, problems: &mut Vec<&'static str>) {
    if name.map_or(true, |n| n.trim().is_empty()) {
        problems.push("Please tell us your name!");
    }
}

pub fn email_problems(email: Option<&str>, problems: &mut Vec<&'static str>) {
    match email.map(str::trim) {
        None | Some("") => problems.push("Please provide your email"),
        Some(email) if !is_valid_email(email) => problems.push("Please provide a valid email"),
        Some(_) => {}
    }
}

pub fn password_problems(
    password: Option<&str>,
    confirm: Option<&str>,
    problems: &mut Vec<&'static str>,
) {
    match password {
        None | Some("") => problems.push("Please provide a password"),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            problems.push("A password must have at least 8 characters");
        }
        Some(_) => {}
    }
    match confirm {
        None | Some("") => problems.push("Please confirm your password"),
        Some(c) if Some(c) != password => problems.push("Passwords are not the same!"),
        Some(_) => {}
    }
}

pub fn into_result(problems: &[&str]) -> Result<(), AppError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Invalid input data. {}",
            problems.join(". ")
        )))
    }
}
