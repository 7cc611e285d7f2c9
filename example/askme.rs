//! "ask me" screen on top of bevy_askme.
//! - prompt line at the bottom (enter submits).
//! - middle area: idle hint, loading line, the answer, or the generic error.
//! - history panel (tab) lists past questions; up/down + enter loads one
//!   back into the prompt, delete clears history.
//! - escape clears the current answer.
//!
//! env:
//!   GROQ_API_KEY     (key; empty -> every ask fails locally)
//!   ASKME_ENDPOINT   (default groq chat completions)
//!   ASKME_MODEL      (default mixtral-8x7b-32768)

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy::ui::Display;
use bevy_askme::{
    AskFailed, AskSet, AskSettled, AskmeConfig, AskmePlugin, AskmeSession, QueryInput, SessionState,
    SubmitQuery, submit_query,
};

const IDLE_HINT: &str = "Start searching legal topics or ask me anything!";

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct AnswerText;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct HistoryPanel;
#[derive(Component)]
struct HistoryText;

// ---------------------- app state ----------------------

#[derive(Resource, Default)]
struct HistoryView {
    open: bool,
    cursor: usize,
}

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let config = AskmeConfig::from_env();
    info!(
        target: "askme",
        "endpoint='{}', model='{}', key_present={}",
        config.completion.endpoint, config.completion.model, config.credential.is_present()
    );

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(config)
        .insert_resource(HistoryView::default())
        .add_plugins(DefaultPlugins)
        .add_plugins(AskmePlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_text_input, handle_history_keys).chain())
        // event readers should run after bevy_askme applies completions
        .add_systems(
            Update,
            (on_failed, on_settled, refresh_answer_text, refresh_prompt_text, refresh_history)
                .after(AskSet::Drain),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d::default());

    let style_18 = TextFont { font_size: 18.0, ..default() };
    let style_14 = TextFont { font_size: 14.0, ..default() };

    // root
    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            p.spawn((
                Text::new("[tab] history  [esc] clear answer"),
                style_14.clone(),
                TextColor(Color::srgb_u8(150, 150, 150)),
            ));

            // --- answer box ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_grow: 1.0,
                    align_items: AlignItems::Center,
                    justify_content: JustifyContent::Center,
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    ..default()
                },
                BackgroundColor(Color::NONE),
            ))
            .with_children(|c| {
                c.spawn((
                    Text::new(IDLE_HINT),
                    style_18.clone(),
                    TextColor(Color::WHITE),
                    AnswerText,
                ));
            });

            // --- history panel (hidden until tab) ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Auto,
                    flex_direction: FlexDirection::Column,
                    padding: UiRect::all(Val::Px(8.0)),
                    display: Display::None,
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
                HistoryPanel,
            ))
            .with_children(|c| {
                c.spawn((Text::new(""), style_14.clone(), TextColor(Color::WHITE), HistoryText));
            });

            // --- prompt line ---
            p.spawn((
                Text::new("> "),
                style_14.clone(),
                TextColor(Color::WHITE),
                PromptText,
            ));
        });
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    view: Res<HistoryView>,
    mut input: ResMut<QueryInput>,
    mut session: ResMut<AskmeSession>,
    mut ev_submit: EventWriter<SubmitQuery>,
) {
    // the history panel owns the keyboard while open
    if view.open {
        ev_kbd.clear();
        return;
    }

    for ev in ev_kbd.read() {
        if ev.state.is_pressed() {
            if let Some(txt) = &ev.text {
                let s = txt.replace('\r', "").replace('\n', "").replace('\t', "");
                input.0.push_str(&s);
            }
        }
    }

    if keys.just_pressed(KeyCode::Backspace) {
        input.0.pop();
    }

    if keys.just_pressed(KeyCode::Escape) {
        session.clear_result();
    }

    // submitting while a question is out supersedes it
    if keys.just_pressed(KeyCode::Enter) {
        submit_query(&mut ev_submit, input.0.clone());
    }
}

fn handle_history_keys(
    keys: Res<ButtonInput<KeyCode>>,
    mut view: ResMut<HistoryView>,
    mut session: ResMut<AskmeSession>,
    mut input: ResMut<QueryInput>,
) {
    if keys.just_pressed(KeyCode::Tab) {
        view.open = !view.open;
        view.cursor = 0;
        info!(target: "askme", "history panel open={}", view.open);
        return;
    }
    if !view.open {
        return;
    }

    let len = session.history().len();
    if keys.just_pressed(KeyCode::ArrowDown) && len > 0 {
        view.cursor = (view.cursor + 1) % len;
    }
    if keys.just_pressed(KeyCode::ArrowUp) && len > 0 {
        view.cursor = (view.cursor + len - 1) % len;
    }
    if keys.just_pressed(KeyCode::Delete) {
        session.clear_history();
        view.cursor = 0;
    }
    if keys.just_pressed(KeyCode::Enter) {
        if let Some(entry) = session.history().entries().get(view.cursor).cloned() {
            input.0 = session.select_history(entry).into_string();
        }
        view.open = false;
    }
    if keys.just_pressed(KeyCode::Escape) {
        view.open = false;
    }
}

// ---------------------- ask events ----------------------

fn on_failed(mut ev: EventReader<AskFailed>) {
    for AskFailed { query, kind } in ev.read() {
        // diagnostics go to the log only; the screen shows the generic text
        error!(target: "askme", "ask failed ({} chars): {:?}", query.as_str().len(), kind);
    }
}

fn on_settled(mut ev: EventReader<AskSettled>) {
    for AskSettled { applied } in ev.read() {
        debug!(target: "askme", "attempt settled (applied={})", applied);
    }
}

// ---------------------- text refresh ----------------------

fn refresh_answer_text(
    session: Res<AskmeSession>,
    mut q: Query<(&mut Text, &mut TextColor), With<AnswerText>>,
) {
    if !session.is_changed() {
        return;
    }
    if let Ok((mut t, mut color)) = q.single_mut() {
        let state = session.state();
        let shown = state.display_text().unwrap_or_default().to_string();
        let (text, c) = match state {
            SessionState::Idle => (IDLE_HINT.to_string(), Color::WHITE),
            SessionState::Pending { .. } => ("thinking...".to_string(), Color::srgb_u8(200, 200, 200)),
            SessionState::Succeeded { .. } => (shown, Color::WHITE),
            SessionState::Failed { .. } => (shown, Color::srgb_u8(255, 80, 80)),
        };
        t.0 = text;
        color.0 = c;
    }
}

fn refresh_prompt_text(
    input: Res<QueryInput>,
    session: Res<AskmeSession>,
    mut q_prompt: Query<&mut Text, With<PromptText>>,
) {
    if input.is_changed() || session.is_changed() {
        if let Ok(mut t) = q_prompt.single_mut() {
            let caret = if session.state().is_pending() { "" } else { " |" };
            t.0 = format!("> {}{}", input.0, caret);
        }
    }
}

fn refresh_history(
    view: Res<HistoryView>,
    session: Res<AskmeSession>,
    mut q_panel: Query<&mut Node, With<HistoryPanel>>,
    mut q_text: Query<&mut Text, With<HistoryText>>,
) {
    if !(view.is_changed() || session.is_changed()) {
        return;
    }
    if let Ok(mut node) = q_panel.single_mut() {
        node.display = if view.open { Display::Flex } else { Display::None };
    }
    if let Ok(mut t) = q_text.single_mut() {
        let entries = session.history().entries();
        let mut out = String::from("search history:\n");
        if entries.is_empty() {
            out.push_str("  no search history available\n");
        } else {
            for (i, entry) in entries.iter().enumerate() {
                let marker = if i == view.cursor { ">" } else { " " };
                out.push_str(&format!("{marker} {entry}\n"));
            }
            out.push_str("[enter] use  [del] clear history  [esc] close");
        }
        t.0 = out;
    }
}
