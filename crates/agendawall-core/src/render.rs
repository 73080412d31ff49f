//! Turning an [`AgendaSnapshot`] into a transport-ready payload.
//!
//! Renderers are pure: the same snapshot always renders to the same bytes.

use std::fmt::Write as _;

use thiserror::Error;

use crate::agenda::{AgendaSnapshot, ContributionView, PresenterView, SessionView};
use crate::time::format_minutes;

/// Errors raised while rendering a snapshot.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Writing into the output buffer failed.
    #[error("failed to format output: {0}")]
    Format(#[from] std::fmt::Error),

    /// JSON serialization failed.
    #[error("failed to serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Converts a snapshot into the payload pushed to viewers.
pub trait Renderer: Send + Sync {
    /// Short name used in logs and status output.
    fn name(&self) -> &'static str;

    /// Renders a snapshot.
    fn render(&self, snapshot: &AgendaSnapshot) -> Result<String, RenderError>;
}

/// Escapes text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Renders the agenda fragment injected into the kiosk page.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    fn write_session(out: &mut String, session: &SessionView) -> std::fmt::Result {
        write!(
            out,
            "\n<h2 class=\"{}\">{} ({} - {})",
            session.css_class(),
            html_escape(&session.title),
            session.start,
            session.stop
        )?;
        if !session.room.is_empty() {
            write!(out, " Room: {}", html_escape(&session.room))?;
        }
        out.push_str("</h2>");

        for contribution in &session.contributions {
            Self::write_contribution(out, contribution)?;
        }
        Ok(())
    }

    fn write_contribution(out: &mut String, c: &ContributionView) -> std::fmt::Result {
        let class = c.css_class();
        write!(
            out,
            "\n\t<div class=\"contribution {class}\">\
             \n\t\t<h3 class=\"{class}\">{} - {}</h3>\
             \n\t\t<b>{}</b> (<i>{}</i>)",
            c.start,
            c.stop,
            html_escape(&c.title),
            format_minutes(c.duration_minutes)
        )?;
        if !c.presenters.is_empty() {
            write!(out, "\n\t\t<p>{}</p>", presenters_html(&c.presenters))?;
        }
        out.push_str("\n\t</div>");
        Ok(())
    }
}

impl Renderer for HtmlRenderer {
    fn name(&self) -> &'static str {
        "html"
    }

    fn render(&self, snapshot: &AgendaSnapshot) -> Result<String, RenderError> {
        let mut out = String::with_capacity(1024);
        write!(
            out,
            "<h1 id=\"agenda-day\">{}</h1>",
            html_escape(&snapshot.label)
        )?;
        for session in &snapshot.sessions {
            Self::write_session(&mut out, session)?;
        }
        out.push('\n');
        Ok(out)
    }
}

/// `Name (<em>Affiliation</em>), Name`.
fn presenters_html(presenters: &[PresenterView]) -> String {
    presenters
        .iter()
        .map(|p| {
            if p.affiliation.is_empty() {
                html_escape(&p.name)
            } else {
                format!(
                    "{} (<em>{}</em>)",
                    html_escape(&p.name),
                    html_escape(&p.affiliation)
                )
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the snapshot as JSON for programmatic viewers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pretty: bool,
}

impl JsonRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

impl Renderer for JsonRenderer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn render(&self, snapshot: &AgendaSnapshot) -> Result<String, RenderError> {
        let out = if self.pretty {
            serde_json::to_string_pretty(snapshot)?
        } else {
            serde_json::to_string(snapshot)?
        };
        Ok(out)
    }
}
