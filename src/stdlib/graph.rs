use super::{Args, Module, Param, Produced, ANY, NUMBER, STRING};
use crate::{
    diagnostics::{Diagnostic, ErrorCode, WarningCode},
    network::{Edge, Network, Node},
    value::{Kind, Value, ValueKind},
};

const NODE: &[Param] = &[Param::required("name", STRING)];
const EDGE: &[Param] = &[
    Param::required("from", ANY),
    Param::required("to", ANY),
    Param::optional("weight", NUMBER),
    Param::optional("directed", &[Kind::Boolean]),
];
const ITEMS: &[Param] = &[Param::variadic("items", ANY)];
const GRAPH: &[Param] = &[Param::required("g", &[Kind::Network])];
const AT_NODE: &[Param] = &[
    Param::required("g", &[Kind::Network]),
    Param::required("node", ANY),
];

pub(super) fn module() -> Module {
    let mut module = Module::new("graph", false);
    module.function("node", NODE, |args| {
        Ok(Value::new(ValueKind::Node(Node::new(args.string("name")?))).into())
    });
    module.function("edge", EDGE, edge);
    module.function("network", ITEMS, network);
    module.function("nodes", GRAPH, |args| {
        let network = network_arg(args)?;
        Ok(Value::strings(network.nodes().map(String::from)).into())
    });
    module.function("edges", GRAPH, |args| {
        let network = network_arg(args)?;
        let edges = network
            .edges()
            .iter()
            .map(|edge| Value::new(ValueKind::Edge(edge.clone())))
            .collect();
        Ok(Value::vector(edges).into())
    });
    module.function("neighbors", AT_NODE, |args| {
        let (network, name) = (network_arg(args)?, node_arg(args)?);
        Ok(Value::strings(network.neighbors(&name).map(|(next, _)| next.to_string())).into())
    });
    module.function("degree", AT_NODE, |args| {
        let (network, name) = (network_arg(args)?, node_arg(args)?);
        Ok(Value::number(network.degree(&name) as f64).into())
    });
    module
}

pub(super) fn node_name(value: &Value) -> Option<String> {
    match &*value.kind {
        ValueKind::String(name) => Some(name.clone()),
        ValueKind::Node(node) => Some(node.name.clone()),
        _ => None,
    }
}

fn endpoint(args: &Args, param: &str) -> Result<String, Diagnostic> {
    let value = args.value(param)?;
    node_name(value).ok_or_else(|| args.type_error(param, Kind::Node, value))
}

fn edge(args: &Args) -> Result<Produced, Diagnostic> {
    let directed = match args.get("directed") {
        Some(value) => value.as_bool().unwrap_or(false),
        None => false,
    };
    Ok(Value::new(ValueKind::Edge(Edge {
        from: endpoint(args, "from")?,
        to: endpoint(args, "to")?,
        weight: args.number_or("weight", 1.0)?,
        directed,
    }))
    .into())
}

fn network(args: &Args) -> Result<Produced, Diagnostic> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for value in args.rest() {
        gather(args, value, &mut nodes, &mut edges)?;
    }
    let mut warnings = Vec::new();
    if !nodes.is_empty() {
        for edge in &edges {
            for end in [&edge.from, &edge.to] {
                let listed = nodes.iter().any(|node| &node.name == end);
                let reported = warnings
                    .iter()
                    .any(|w: &Diagnostic| w.strings.first() == Some(end));
                if !listed && !reported {
                    warnings.push(Diagnostic::warning(WarningCode::ImplicitNode).with_str(end.clone()));
                }
            }
        }
    }
    Ok(Produced {
        value: Value::new(ValueKind::Network(Network::new(nodes, edges))),
        warnings,
    })
}

fn gather(args: &Args, value: &Value, nodes: &mut Vec<Node>, edges: &mut Vec<Edge>) -> Result<(), Diagnostic> {
    match &*value.kind {
        ValueKind::Node(node) => nodes.push(node.clone()),
        ValueKind::String(name) => nodes.push(Node::new(name.clone())),
        ValueKind::Edge(edge) => edges.push(edge.clone()),
        ValueKind::Array(array) if !array.is_matrix() => {
            for item in &array.items {
                gather(args, item, nodes, edges)?;
            }
        }
        _ => return Err(args.type_error("items", Kind::Edge, value)),
    }
    Ok(())
}

fn network_arg(args: &Args) -> Result<&Network, Diagnostic> {
    let value = args.value("g")?;
    match &*value.kind {
        ValueKind::Network(network) => Ok(network),
        _ => Err(args.type_error("g", Kind::Network, value)),
    }
}

fn node_arg(args: &Args) -> Result<String, Diagnostic> {
    let name = endpoint(args, "node")?;
    let network = network_arg(args)?;
    if network.contains(&name) {
        Ok(name)
    } else {
        Err(Diagnostic::error(ErrorCode::UnknownNode)
            .with_value(args.value("g")?)
            .with_str(name))
    }
}
