use std::fmt;

use chart_schema::TechCounts;

use crate::parser::{Measure, LANES};

pub const DEFAULT_INVALID_CROSSOVER_THRESHOLD: usize = 9;

/// One entry of the arrow list: a single-lane step, or a multi-lane row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Left,
    Down,
    Up,
    Right,
    Jump,
    Hand,
}

impl Arrow {
    const DIRECTIONS: [Arrow; LANES] = [Arrow::Left, Arrow::Down, Arrow::Up, Arrow::Right];

    pub const fn as_char(self) -> char {
        match self {
            Arrow::Left => 'L',
            Arrow::Down => 'D',
            Arrow::Up => 'U',
            Arrow::Right => 'R',
            Arrow::Jump => 'J',
            Arrow::Hand => 'H',
        }
    }

    const fn is_multi(self) -> bool {
        matches!(self, Arrow::Jump | Arrow::Hand)
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub const fn toggle(self) -> Self {
        match self {
            Foot::Left => Foot::Right,
            Foot::Right => Foot::Left,
        }
    }

    /// True when this foot is on the arrow of the opposite side.
    const fn is_crossed_on(self, arrow: Arrow) -> bool {
        matches!(
            (self, arrow),
            (Foot::Right, Arrow::Left) | (Foot::Left, Arrow::Right)
        )
    }

    const fn is_home_on(self, arrow: Arrow) -> bool {
        matches!(
            (self, arrow),
            (Foot::Left, Arrow::Left) | (Foot::Right, Arrow::Right)
        )
    }
}

/// Flattens the chart into one arrow per row that has at least one steppable note.
pub fn arrow_list(measures: &[Measure]) -> Vec<Arrow> {
    let mut arrows = Vec::new();
    for row in measures.iter().flat_map(|m| &m.rows) {
        let mut lanes = row
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_steppable())
            .map(|(lane, _)| lane);
        let Some(first) = lanes.next() else {
            continue;
        };
        arrows.push(match lanes.count() {
            0 => Arrow::DIRECTIONS[first],
            1 => Arrow::Jump,
            _ => Arrow::Hand,
        });
    }
    arrows
}

pub fn arrow_string(arrows: &[Arrow]) -> String {
    arrows.iter().map(|a| a.as_char()).collect()
}

/// Runs between jumps/hands that can contain a crossover: at least 3 steps, both sides present.
pub fn crossover_candidate_runs(arrows: &[Arrow]) -> Vec<&[Arrow]> {
    arrows
        .split(|a| a.is_multi())
        .filter(|run| {
            run.len() >= 3 && run.contains(&Arrow::Left) && run.contains(&Arrow::Right)
        })
        .collect()
}

pub fn detect_tech_patterns(measures: &[Measure], invalid_crossover_threshold: usize) -> TechCounts {
    let arrows = arrow_list(measures);
    let mut counts = TechCounts::default();
    for run in crossover_candidate_runs(&arrows) {
        counts.merge(simulate_run(run, invalid_crossover_threshold));
    }
    counts
}

/// The first side arrow is taken by its own foot; feet alternate back to the run start.
fn starting_foot(run: &[Arrow]) -> Option<Foot> {
    let left = run.iter().position(|a| *a == Arrow::Left)?;
    let right = run.iter().position(|a| *a == Arrow::Right)?;
    let (offset, foot) = if right < left {
        (right, Foot::Right)
    } else {
        (left, Foot::Left)
    };
    Some(if offset % 2 == 0 { foot } else { foot.toggle() })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    None,
    Footswitch,
    Jack,
}

fn close_repeat(repeat: Repeat, counts: &mut TechCounts) {
    match repeat {
        Repeat::Footswitch => counts.footswitches += 1,
        Repeat::Jack => counts.jacks += 1,
        Repeat::None => {}
    }
}

pub fn simulate_run(run: &[Arrow], invalid_crossover_threshold: usize) -> TechCounts {
    let mut counts = TechCounts::default();
    let Some(mut active) = starting_foot(run) else {
        return counts;
    };

    let mut previous: Option<Arrow> = None;
    let mut repeat = Repeat::None;
    let mut crossed_over = false;
    let mut crossed_len = 0usize;

    for &arrow in run {
        let repeated = previous == Some(arrow);
        if repeated {
            repeat = match repeat {
                Repeat::None => Repeat::Footswitch,
                Repeat::Footswitch | Repeat::Jack => Repeat::Jack,
            };
        } else {
            close_repeat(repeat, &mut counts);
            repeat = Repeat::None;
        }

        if active.is_crossed_on(arrow) {
            crossed_over = true;
        }

        if crossed_over && active.is_home_on(arrow) {
            counts.crossovers += 1;
            crossed_over = false;
            crossed_len = 0;
            if repeated {
                counts.crossover_footswitches += 1;
            }
        }

        if crossed_over {
            crossed_len += 1;
            if crossed_len >= invalid_crossover_threshold {
                counts.invalid_crossovers += 1;
                crossed_over = false;
                crossed_len = 0;
                active = active.toggle();
            }
        }

        active = active.toggle();
        previous = Some(arrow);
    }

    // a repeat chain only counts once a different arrow closes it
    counts
}
