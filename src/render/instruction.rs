use std::fmt;

use super::graph::Action;

/// What feeds one ffmpeg input slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderInstruction {
    /// A cut `[start, end]` of a video file, in seconds.
    Video { file: String, start: f64, end: f64 },
    /// A still image or a clip played in full.
    Static { file: String },
    /// Solid color background.
    ColorScreen {
        color: String,
        width: u32,
        height: u32,
        fps: u32,
    },
    /// Placeholder slot, never referenced by the filtergraph.
    Ignore,
}

impl RenderInstruction {
    pub fn black_screen(width: u32, height: u32, fps: u32) -> Self {
        RenderInstruction::ColorScreen {
            color: "black".to_string(),
            width,
            height,
            fps,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            RenderInstruction::Video { file, .. } | RenderInstruction::Static { file } => Some(file),
            RenderInstruction::ColorScreen { .. } | RenderInstruction::Ignore => None,
        }
    }

    /// ffmpeg arguments declaring this input.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            RenderInstruction::Video { file, start, end } => vec![
                "-ss".to_string(),
                start.to_string(),
                "-to".to_string(),
                end.to_string(),
                "-i".to_string(),
                file.clone(),
            ],
            RenderInstruction::Static { file } => {
                vec!["-r".to_string(), "60".to_string(), "-i".to_string(), file.clone()]
            }
            RenderInstruction::ColorScreen {
                color,
                width,
                height,
                fps,
            } => {
                let source = Action::new("color")
                    .param("c", color)
                    .param("s", format!("{}x{}", width, height))
                    .param("r", fps);
                vec!["-f".to_string(), "lavfi".to_string(), "-i".to_string(), source.to_string()]
            }
            RenderInstruction::Ignore => vec![
                "-f".to_string(),
                "lavfi".to_string(),
                "-i".to_string(),
                "nullsrc".to_string(),
            ],
        }
    }
}

impl fmt::Display for RenderInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderInstruction::Video { file, start, end } => write!(f, "video {} [{:.3} ~ {:.3}]", file, start, end),
            RenderInstruction::Static { file } => write!(f, "static {}", file),
            RenderInstruction::ColorScreen {
                color,
                width,
                height,
                fps,
            } => write!(f, "color {} {}x{}@{}", color, width, height, fps),
            RenderInstruction::Ignore => f.write_str("ignore"),
        }
    }
}

/// Seconds rounded to milliseconds.
pub fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_args() {
        let video = RenderInstruction::Video {
            file: "a.mp4".to_string(),
            start: 37.0,
            end: 40.25,
        };
        assert_eq!(video.input_args(), vec!["-ss", "37", "-to", "40.25", "-i", "a.mp4"]);

        assert_eq!(
            RenderInstruction::black_screen(1600, 900, 60).input_args(),
            vec!["-f", "lavfi", "-i", "color=c=black:s=1600x900:r=60"]
        );
        assert_eq!(RenderInstruction::Ignore.input_args()[3], "nullsrc");
        assert_eq!(
            RenderInstruction::Static { file: "team.png".to_string() }.input_args(),
            vec!["-r", "60", "-i", "team.png"]
        );
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(75.0 / 60.0), 1.25);
        assert_eq!(round_ms(1.0 / 3.0), 0.333);
    }
}
