use axum::response::Html;

use crate::auth::CurrentUser;
use crate::html::{escape, page};

pub async fn overview(user: Option<CurrentUser>) -> Html<String> {
    let user = user.map(|CurrentUser(user)| user);
    let greeting = match user {
        Some(ref user) => format!("Welcome back, {}!", escape(&user.name)),
        None => "Welcome to Natours!".to_string(),
    };
    let content = format!(
        r#"<div class="card-container"><h2 class="heading-secondary">{greeting}</h2></div>"#
    );
    Html(page("All Tours", user.as_ref(), &content))
}

pub async fn login_form(user: Option<CurrentUser>) -> Html<String> {
    let user = user.map(|CurrentUser(user)| user);
    let content = r#"<div class="login-form"><h2 class="heading-secondary ma-bt-lg">Log into your account</h2>
<form class="form form--login">
<div class="form__group"><label class="form__label" for="email">Email address</label><input class="form__input" id="email" type="email" placeholder="you@example.com" required></div>
<div class="form__group ma-bt-md"><label class="form__label" for="password">Password</label><input class="form__input" id="password" type="password" placeholder="••••••••" required minlength="8"></div>
<div class="form__group"><button class="btn btn--green">Login</button></div>
</form></div>"#;
    Html(page("Log into your account", user.as_ref(), content))
}

/// Requires `protect`; without a session the error page is rendered instead.
pub async fn account(CurrentUser(user): CurrentUser) -> Html<String> {
    let content = format!(
        r#"<div class="user-view"><div class="user-view__content"><div class="user-view__form-container">
<h2 class="heading-secondary ma-bt-md">Your account settings</h2>
<p class="form__label">Name</p><p>{name}</p>
<p class="form__label">Email address</p><p>{email}</p>
<p class="form__label">Role</p><p>{role}</p>
</div></div></div>"#,
        name = escape(&user.name),
        email = escape(&user.email),
        role = user.role,
    );
    Html(page("Your account", Some(&user), &content))
}
