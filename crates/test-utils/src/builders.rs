#![allow(dead_code)]

use scriptrunner::metadata::{ParameterDefinition, ScriptMetadata};
use scriptrunner::types::ParamType;

/// Builds script text with a metadata header, for feeding repositories and
/// the parser.
#[derive(Debug, Clone)]
pub struct ScriptTextBuilder {
    id: String,
    name: String,
    category: String,
    connection_string: Option<String>,
    params: Vec<String>,
    body: String,
}

impl ScriptTextBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: "General".to_string(),
            connection_string: None,
            params: Vec::new(),
            body: String::new(),
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn connection_string(mut self, conn: &str) -> Self {
        self.connection_string = Some(conn.to_string());
        self
    }

    /// Add a parameter; `extra` lines (e.g. `"Required: true"`) follow the
    /// type line.
    pub fn param(mut self, name: &str, ty: &str, extra: &[&str]) -> Self {
        let mut block = format!("- Name: {name}\n  Type: {ty}\n");
        for line in extra {
            block.push_str("  ");
            block.push_str(line);
            block.push('\n');
        }
        self.params.push(block);
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Header wrapped in a shell block comment.
    pub fn build_shell(&self) -> String {
        format!("<#\n{}#>\n{}", self.header(), self.body)
    }

    /// Header wrapped in a SQL block comment.
    pub fn build_sql(&self) -> String {
        format!("/*\n{}*/\n{}", self.header(), self.body)
    }

    fn header(&self) -> String {
        let mut out = String::from("SCRIPT-METADATA:\n");
        out.push_str(&format!(
            "Id: {}\nName: {}\nCategory: {}\n",
            self.id, self.name, self.category
        ));
        if let Some(conn) = &self.connection_string {
            out.push_str(&format!("SqlConnectionString: \"{conn}\"\n"));
        }
        if !self.params.is_empty() {
            out.push_str("Parameters:\n");
            for p in &self.params {
                out.push_str(p);
            }
        }
        out.push_str("END-SCRIPT-METADATA\n");
        out
    }
}

/// Builder for `ScriptMetadata` to simplify dispatcher and executor setup.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    meta: ScriptMetadata,
}

impl MetadataBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            meta: ScriptMetadata {
                id: id.to_string(),
                name: id.to_string(),
                category: "General".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn source_path(mut self, path: &str) -> Self {
        self.meta.source_path = Some(path.to_string());
        self
    }

    pub fn param(mut self, name: &str, ty: ParamType, required: bool) -> Self {
        let mut def = ParameterDefinition::new(name, ty);
        def.required = required;
        self.meta.parameters.push(def);
        self
    }

    pub fn connection_string(mut self, conn: &str) -> Self {
        self.meta.connection_string = Some(conn.to_string());
        self
    }

    pub fn build(self) -> ScriptMetadata {
        self.meta
    }
}
