//! Python bindings for the kanamark parser.
//!
//! Nodes cross the boundary in tuple shape: a text leaf is a `str`, an
//! element is a `(tag, attrs, children)` tuple where `attrs` is a `dict` or
//! `None` and `children` is `None` (void), a `list` of nodes, or one node.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use kanamark_core::{
    join, Attributes, Children, ElementBuilder, ElementMapper, ExportStrategy, Exported, JoinFn,
    Node, ParseOptions, Parser as CoreParser, Plugin, PluginOutput, PluginRegistry,
    DEFAULT_MAX_NESTING,
};
use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyString, PyTuple};
use pyo3::IntoPyObjectExt;

create_exception!(
    pykm,
    ResourceExhausted,
    PyException,
    "Nesting depth or input size went past the configured limit."
);

// ============================================================================
// Node conversion
// ============================================================================

fn node_to_py<'py>(py: Python<'py>, node: &Node) -> PyResult<Bound<'py, PyAny>> {
    match node {
        Node::Text(text) => Ok(PyString::new(py, text).into_any()),
        Node::Element(element) => {
            let attrs = match &element.attrs {
                Some(attrs) => {
                    let dict = PyDict::new(py);
                    for (key, value) in attrs.iter() {
                        dict.set_item(key, value)?;
                    }
                    dict.into_any()
                }
                None => py.None().into_bound(py),
            };
            let tuple = PyTuple::new(
                py,
                [
                    PyString::new(py, &element.tag).into_any(),
                    attrs,
                    children_to_py(py, &element.children)?,
                ],
            )?;
            Ok(tuple.into_any())
        }
    }
}

fn children_to_py<'py>(py: Python<'py>, children: &Children) -> PyResult<Bound<'py, PyAny>> {
    match children {
        Children::Empty => Ok(py.None().into_bound(py)),
        Children::Single(node) => node_to_py(py, node),
        Children::Many(nodes) => Ok(nodes_to_py(py, nodes)?.into_any()),
    }
}

fn nodes_to_py<'py>(py: Python<'py>, nodes: &[Node]) -> PyResult<Bound<'py, PyList>> {
    let items = nodes
        .iter()
        .map(|node| node_to_py(py, node))
        .collect::<PyResult<Vec<_>>>()?;
    PyList::new(py, items)
}

fn node_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Node> {
    if let Ok(text) = obj.downcast::<PyString>() {
        return Ok(Node::text(text.to_str()?));
    }

    let Ok(tuple) = obj.downcast::<PyTuple>() else {
        return Err(PyTypeError::new_err(format!(
            "expected str or (tag, attrs, children) tuple, got {}",
            obj.get_type().name()?
        )));
    };
    if tuple.len() != 3 {
        return Err(PyTypeError::new_err(format!(
            "element tuple must have 3 items, got {}",
            tuple.len()
        )));
    }

    let tag: String = tuple.get_item(0)?.extract()?;
    if tag.is_empty() {
        return Err(PyValueError::new_err("element tag must not be empty"));
    }
    let attrs = attrs_from_py(&tuple.get_item(1)?)?;
    let children = children_from_py(&tuple.get_item(2)?)?;
    Ok(Node::element(tag, attrs, children))
}

fn children_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Children> {
    if obj.is_none() {
        return Ok(Children::Empty);
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        let nodes = list
            .iter()
            .map(|item| node_from_py(&item))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Children::Many(nodes));
    }
    Ok(Children::from(node_from_py(obj)?))
}

fn attrs_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Option<Attributes>> {
    if obj.is_none() {
        return Ok(None);
    }
    let Ok(dict) = obj.downcast::<PyDict>() else {
        return Err(PyTypeError::new_err("attributes must be a dict or None"));
    };
    let mut attrs = Attributes::new();
    for (key, value) in dict.iter() {
        attrs.insert(key.extract::<String>()?, value.extract::<String>()?);
    }
    Ok(attrs.into_option())
}

fn output_from_py(obj: &Bound<'_, PyAny>) -> PyResult<PluginOutput> {
    if let Ok(text) = obj.downcast::<PyString>() {
        return Ok(PluginOutput::Text(text.to_str()?.to_owned()));
    }
    Ok(PluginOutput::Node(node_from_py(obj)?))
}

// ============================================================================
// Plugin helpers handed to Python callables
// ============================================================================

/// Builds element tuples: `mapper.map("span", {"class": "x"}).children("text")`.
#[pyclass(frozen, name = "Mapper")]
pub struct PyMapper;

#[pymethods]
impl PyMapper {
    #[pyo3(signature = (tag, attrs=None), text_signature = "(self, tag, attrs=None)")]
    fn map(&self, tag: String, attrs: Option<&Bound<'_, PyAny>>) -> PyResult<PyWrapper> {
        if tag.is_empty() {
            return Err(PyValueError::new_err("element tag must not be empty"));
        }
        let attrs = match attrs {
            Some(obj) => attrs_from_py(obj)?,
            None => None,
        };
        Ok(PyWrapper {
            builder: ElementMapper::default().map(tag, attrs),
        })
    }

    fn __repr__(&self) -> &'static str {
        "Mapper()"
    }
}

/// A pending element; finish with `children(...)` or `empty()`.
#[pyclass(frozen, name = "Wrapper")]
pub struct PyWrapper {
    builder: ElementBuilder,
}

#[pymethods]
impl PyWrapper {
    #[pyo3(text_signature = "(self, children)")]
    fn children<'py>(
        &self,
        py: Python<'py>,
        children: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let children = children_from_py(children)?;
        node_to_py(py, &self.builder.clone().children(children))
    }

    /// Finish as a void element.
    fn empty<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        node_to_py(py, &self.builder.clone().empty())
    }
}

/// Concatenates the visible text of a node or a list of nodes.
#[pyclass(frozen, name = "Joiner")]
pub struct PyJoiner;

#[pymethods]
impl PyJoiner {
    fn __call__(&self, content: &Bound<'_, PyAny>) -> PyResult<String> {
        Ok(join(&children_from_py(content)?.into_vec()))
    }
}

// ============================================================================
// Python callables as plugins
// ============================================================================

/// First exception raised by a plugin during one parse call.
#[derive(Clone, Default)]
struct PluginErrors(Arc<Mutex<Option<PyErr>>>);

impl PluginErrors {
    fn record(&self, err: PyErr) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    fn is_set(&self) -> bool {
        self.0.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn take(&self) -> Option<PyErr> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct PyPlugin {
    callable: Py<PyAny>,
    errors: PluginErrors,
}

impl PyPlugin {
    fn invoke(&self, py: Python<'_>, args: &str, content: &[Node]) -> PyResult<PluginOutput> {
        let content = nodes_to_py(py, content)?;
        let mapper = Py::new(py, PyMapper)?;
        let joiner = Py::new(py, PyJoiner)?;
        let out = self
            .callable
            .bind(py)
            .call1((args, content, mapper, joiner))?;
        output_from_py(&out)
    }
}

impl Plugin for PyPlugin {
    fn call(
        &self,
        args: &str,
        content: &[Node],
        _mapper: &ElementMapper,
        _join: JoinFn,
    ) -> PluginOutput {
        // Once a callable has raised, the parse result is discarded anyway.
        if self.errors.is_set() {
            return PluginOutput::Text(String::new());
        }
        Python::with_gil(|py| match self.invoke(py, args, content) {
            Ok(out) => out,
            Err(err) => {
                self.errors.record(err);
                PluginOutput::Text(String::new())
            }
        })
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Kanamark parser. Safe to share between threads; each `parse` call gets
/// its own plugin error state.
///
/// Args:
///     format: "html" (default) or "ast"
///     plugins: dict mapping plugin names to callables
///         `(args, content, mapper, join) -> str | node`
///     max_nesting: maximum nesting depth (default 64)
///     max_input_bytes: reject larger inputs (default unlimited)
#[pyclass(frozen, name = "Parser")]
pub struct PyParser {
    /// Everything but the plugins, which are bound per call.
    options: ParseOptions,
    plugins: BTreeMap<String, Py<PyAny>>,
}

impl PyParser {
    fn bind_plugins(&self, py: Python<'_>, errors: &PluginErrors) -> PluginRegistry {
        self.plugins
            .iter()
            .fold(PluginRegistry::new(), |registry, (name, callable)| {
                registry.register_plugin(
                    name.clone(),
                    PyPlugin {
                        callable: callable.clone_ref(py),
                        errors: errors.clone(),
                    },
                )
            })
    }
}

#[pymethods]
impl PyParser {
    #[new]
    #[pyo3(
        signature = (format="html", plugins=None, max_nesting=None, max_input_bytes=None),
        text_signature = "(format='html', plugins=None, max_nesting=None, max_input_bytes=None)"
    )]
    fn new(
        format: &str,
        plugins: Option<&Bound<'_, PyDict>>,
        max_nesting: Option<usize>,
        max_input_bytes: Option<usize>,
    ) -> PyResult<Self> {
        let export: ExportStrategy = format
            .parse()
            .map_err(|e: kanamark_core::UnknownStrategy| PyValueError::new_err(e.to_string()))?;

        let mut callables = BTreeMap::new();
        if let Some(plugins) = plugins {
            for (name, callable) in plugins.iter() {
                let name: String = name.extract()?;
                if !callable.is_callable() {
                    return Err(PyTypeError::new_err(format!(
                        "plugin '{}' is not callable",
                        name
                    )));
                }
                callables.insert(name, callable.unbind());
            }
        }

        let mut options = ParseOptions::default()
            .with_export(export)
            .with_max_nesting(max_nesting.unwrap_or(DEFAULT_MAX_NESTING));
        if let Some(limit) = max_input_bytes {
            options = options.with_max_input_bytes(limit);
        }

        Ok(PyParser {
            options,
            plugins: callables,
        })
    }

    /// Parse a document. Returns an HTML string or a list of nodes.
    ///
    /// Raises:
    ///     ResourceExhausted: nesting or input size limit exceeded
    ///     Exception: whatever a plugin callable raised
    #[pyo3(text_signature = "(self, text)")]
    fn parse(&self, py: Python<'_>, text: &str) -> PyResult<PyObject> {
        let errors = PluginErrors::default();
        let options = self.options.clone().with_plugins(self.bind_plugins(py, &errors));
        let parser = CoreParser::new(options);

        let result = py.allow_threads(|| parser.parse(text));
        if let Some(err) = errors.take() {
            return Err(err);
        }
        match result {
            Ok(Exported::Html(html)) => html.into_py_any(py),
            Ok(Exported::Ast(nodes)) => Ok(nodes_to_py(py, &nodes)?.into_any().unbind()),
            Err(e) => Err(ResourceExhausted::new_err(e.to_string())),
        }
    }

    #[getter]
    fn format(&self) -> &'static str {
        self.options.export.as_str()
    }

    #[getter]
    fn plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "Parser(format={:?}, plugins={:?}, max_nesting={})",
            self.options.export.as_str(),
            self.plugins.keys().collect::<Vec<_>>(),
            self.options.max_nesting
        )
    }
}

// ============================================================================
// Module functions
// ============================================================================

/// Parse a kanamark string.
///
/// Args:
///     text: Document string to parse
///     format: "html" (default) or "ast"
///     plugins: dict mapping plugin names to callables
///     max_nesting: maximum nesting depth (default 64)
///
/// Returns:
///     str | list: HTML string or list of nodes
///
/// Raises:
///     ResourceExhausted: nesting limit exceeded
#[pyfunction]
#[pyo3(
    signature = (text, format="html", plugins=None, max_nesting=None),
    text_signature = "(text, format='html', plugins=None, max_nesting=None)"
)]
fn parse(
    py: Python<'_>,
    text: &str,
    format: &str,
    plugins: Option<&Bound<'_, PyDict>>,
    max_nesting: Option<usize>,
) -> PyResult<PyObject> {
    let parser = PyParser::new(format, plugins, max_nesting, None)?;
    parser.parse(py, text)
}

/// Render a node or list of nodes to HTML.
#[pyfunction]
#[pyo3(text_signature = "(nodes)")]
fn render_html(nodes: &Bound<'_, PyAny>) -> PyResult<String> {
    let nodes = children_from_py(nodes)?.into_vec();
    Ok(kanamark_core::render_html(&nodes))
}

// ============================================================================
// Module
// ============================================================================

/// Kanamark - Markdown with Japanese ruby annotations and plugins.
#[pymodule]
fn pykm(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("ResourceExhausted", m.py().get_type::<ResourceExhausted>())?;
    m.add("DEFAULT_MAX_NESTING", DEFAULT_MAX_NESTING)?;
    m.add_class::<PyParser>()?;
    m.add_class::<PyMapper>()?;
    m.add_class::<PyWrapper>()?;
    m.add_class::<PyJoiner>()?;
    m.add_function(wrap_pyfunction!(parse, m)?)?;
    m.add_function(wrap_pyfunction!(render_html, m)?)?;
    Ok(())
}
