//! Presentation adapters.
//!
//! Rendering is a pure function from [`AlarmLevel`] to some visual value. An
//! [`AlarmIndicator`] owns an engine and keeps the rendered visual current by
//! observing summary transitions.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::aggregate::SummaryObserver;
use crate::controller::AlarmSummary;
use crate::error::AlarmResult;
use crate::level::AlarmLevel;

/// Turns a summary level into something displayable.
pub trait Presenter: Send + Sync + 'static {
    /// Rendered form.
    type Visual: Clone + Send + Sync + 'static;

    /// Render `level`. Must be pure.
    fn render(&self, level: AlarmLevel) -> Self::Visual;
}

/// Indicator shapes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Circle,
    Rectangle,
    Triangle,
    Ellipse,
    Polygon,
}

impl Shape {
    /// Every shape.
    pub const ALL: [Self; 5] = [Self::Circle, Self::Rectangle, Self::Triangle, Self::Ellipse, Self::Polygon];

    /// Stylesheet selector of the indicator widget drawing this shape.
    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Circle => "AlarmCircle",
            Self::Rectangle => "AlarmRectangle",
            Self::Triangle => "AlarmTriangle",
            Self::Ellipse => "AlarmEllipse",
            Self::Polygon => "AlarmPolygon",
        }
    }
}

/// An RGBA color.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    #[must_use]
    const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }
}

/// Fill color for an indicator at `level`.
#[must_use]
pub const fn indicator_color(level: AlarmLevel) -> Rgba {
    match level {
        AlarmLevel::Disconnected => Rgba::opaque(255, 255, 255),
        AlarmLevel::NoAlarm => Rgba::opaque(0, 255, 0),
        AlarmLevel::Minor => Rgba::opaque(255, 255, 0),
        AlarmLevel::Major => Rgba::opaque(255, 0, 0),
        AlarmLevel::Invalid => Rgba::opaque(255, 0, 255),
    }
}

/// Renders an indicator stylesheet for one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeStylesheet {
    shape: Shape,
}

impl ShapeStylesheet {
    /// Stylesheet renderer for `shape`.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self { shape }
    }

    /// The shape being styled.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }
}

impl Presenter for ShapeStylesheet {
    type Visual = String;

    fn render(&self, level: AlarmLevel) -> String {
        format!(
            "{} {{border: none; background: transparent; qproperty-penColor: black; \
             qproperty-penWidth: 2; qproperty-penStyle: SolidLine; qproperty-brush: {};}}",
            self.shape.selector(),
            indicator_color(level)
        )
    }
}

type Rendered<V> = Arc<RwLock<Option<(AlarmLevel, V)>>>;

struct RenderingObserver<P: Presenter> {
    presenter: Arc<P>,
    rendered: Rendered<P::Visual>,
}

impl<P: Presenter> SummaryObserver for RenderingObserver<P> {
    fn on_summary_changed(&self, level: AlarmLevel) {
        let visual = self.presenter.render(level);
        *self.rendered.write().unwrap_or_else(PoisonError::into_inner) = Some((level, visual));
    }
}

/// An engine paired with a presenter whose output tracks the summary.
pub struct AlarmIndicator<P: Presenter> {
    engine: AlarmSummary,
    presenter: Arc<P>,
    rendered: Rendered<P::Visual>,
}

impl<P: Presenter> fmt::Debug for AlarmIndicator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmIndicator")
            .field("engine", &self.engine)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl<P: Presenter> AlarmIndicator<P> {
    /// Take ownership of `engine` and render its current summary with `presenter`.
    pub fn new(engine: AlarmSummary, presenter: P) -> AlarmResult<Self> {
        let presenter = Arc::new(presenter);
        let rendered: Rendered<P::Visual> = Arc::new(RwLock::new(None));

        engine.add_observer(Arc::new(RenderingObserver {
            presenter: Arc::clone(&presenter),
            rendered: Arc::clone(&rendered),
        }))?;

        // Read after registering so no transition can fall between the two.
        let level = engine.summary();
        {
            let mut slot = rendered.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some((level, presenter.render(level)));
            }
        }

        Ok(Self {
            engine,
            presenter,
            rendered,
        })
    }

    /// The owned engine.
    #[must_use]
    pub const fn engine(&self) -> &AlarmSummary {
        &self.engine
    }

    /// The presenter.
    #[must_use]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Level of the most recently rendered visual.
    #[must_use]
    pub fn level(&self) -> AlarmLevel {
        self.rendered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(AlarmLevel::Disconnected, |(level, _)| *level)
    }

    /// Most recently rendered visual.
    #[must_use]
    pub fn visual(&self) -> P::Visual {
        let slot = self.rendered.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((_, visual)) => visual.clone(),
            None => self.presenter.render(self.engine.summary()),
        }
    }
}
