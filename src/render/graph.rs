//! ffmpeg filtergraph 模型

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamType {
    Video,
    Audio,
}

impl StreamType {
    pub const ALL: [StreamType; 2] = [StreamType::Video, StreamType::Audio];

    pub fn letter(&self) -> char {
        match self {
            StreamType::Video => 'v',
            StreamType::Audio => 'a',
        }
    }

    /// Pass-through filter for this stream type.
    pub fn null_filter(&self) -> &'static str {
        match self {
            StreamType::Video => "null",
            StreamType::Audio => "anull",
        }
    }

    /// Final output label, `vout` / `aout`.
    pub fn sink(&self) -> StreamRef {
        StreamRef::label(format!("{}out", self.letter()))
    }
}

/// Either an input stream (`[3:v]`) or a named link (`[rvp1_0]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamRef {
    Input { index: usize, kind: StreamType },
    Label(String),
}

impl StreamRef {
    pub fn input(index: usize, kind: StreamType) -> Self {
        StreamRef::Input { index, kind }
    }

    pub fn label(name: impl Into<String>) -> Self {
        StreamRef::Label(name.into())
    }

    pub fn label_name(&self) -> Option<&str> {
        match self {
            StreamRef::Label(name) => Some(name),
            StreamRef::Input { .. } => None,
        }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Input { index, kind } => write!(f, "{}:{}", index, kind.letter()),
            StreamRef::Label(name) => f.write_str(name),
        }
    }
}

/// One filter with its positional and named options.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub op: String,
    pub args: Vec<String>,
    pub params: Vec<(String, String)>,
}

impl Action {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            args: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options: Vec<String> = self
            .args
            .iter()
            .cloned()
            .chain(self.params.iter().map(|(k, v)| format!("{}={}", k, v)))
            .filter(|s| !s.is_empty())
            .collect();
        if options.is_empty() {
            f.write_str(&self.op)
        } else {
            write!(f, "{}={}", self.op, options.join(":"))
        }
    }
}

/// A filter with its input and output links.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub sources: Vec<StreamRef>,
    pub targets: Vec<StreamRef>,
    pub action: Action,
}

impl Graph {
    pub fn new(sources: Vec<StreamRef>, targets: Vec<StreamRef>, action: Action) -> Self {
        Self {
            sources,
            targets,
            action,
        }
    }

    /// A filter fed by the previous filter of the chain.
    pub fn chained(action: Action) -> Self {
        Self::new(Vec::new(), Vec::new(), action)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for source in &self.sources {
            write!(f, "[{}]", source)?;
        }
        write!(f, "{}", self.action)?;
        for target in &self.targets {
            write!(f, "[{}]", target)?;
        }
        Ok(())
    }
}

/// Filters joined by `,` into a single chain.
pub type GraphChain = Vec<Graph>;

/// `[from]null[to]`, or `anull` for audio.
pub fn alias_graph(from: StreamRef, to: &str, kind: StreamType) -> GraphChain {
    vec![Graph::new(
        vec![from],
        vec![StreamRef::label(to)],
        Action::new(kind.null_filter()),
    )]
}

/// Complete `-filter_complex_script` contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterScript {
    chains: Vec<GraphChain>,
}

impl FilterScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: GraphChain) {
        if !chain.is_empty() {
            self.chains.push(chain);
        }
    }

    pub fn chains(&self) -> &[GraphChain] {
        &self.chains
    }

    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.chains.iter().flatten()
    }

    pub fn has_target(&self, target: &StreamRef) -> bool {
        self.graphs().any(|g| g.targets.contains(target))
    }

    pub fn render(&self) -> String {
        let mut script = self
            .chains
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",\n  ")
            })
            .collect::<Vec<_>>()
            .join(";\n");
        script.push('\n');
        script
    }
}
