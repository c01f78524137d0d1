//! Relation hydration.
//!
//! Dotted relation names (`"author.publisher"`) are resolved against model
//! descriptors into a [`RelationPlan`]. Expansion turns the plan into one
//! child specification per node, each restricted to the rows of its parent
//! by an INNER JOIN against the parent's own specification. The root and
//! every child are then fetched in a single batch and the child rows are
//! stitched back onto their parents, deepest level first.

use crate::clause::TableRef;
use crate::condition::{ConditionKind, ConditionTree, Operator, Relation};
use crate::join::{Join, JoinKind};
use crate::spec::{QuerySpec, SpecOptions};
use sqlweave_core::{
    Cardinality, Error, JoinKey, ModelDescriptor, Related, RelationshipInfo, Result, Row,
};
use std::collections::HashMap;

/// Settings for relation expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Alias of the parent sub-query joined into each child spec.
    pub join_alias: String,
    /// Whether child specs select `DISTINCT` rows.
    pub distinct_children: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            join_alias: "t".to_string(),
            distinct_children: true,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_alias(mut self, alias: impl Into<String>) -> Self {
        self.join_alias = alias.into();
        self
    }

    pub fn distinct_children(mut self, distinct: bool) -> Self {
        self.distinct_children = distinct;
        self
    }
}

/// One relation to hydrate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    /// Relation names from the root, e.g. `["author", "publisher"]`.
    pub path: Vec<&'static str>,
    /// Index of the parent node; `None` for relations of the root model.
    pub parent: Option<usize>,
    /// Model the relation is defined on.
    pub owner: &'static ModelDescriptor,
    pub relation: &'static RelationshipInfo,
}

impl PlanNode {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Attachment key on parent rows.
    pub fn name(&self) -> &'static str {
        self.relation.name
    }

    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// The relations requested for a read, ordered by depth.
///
/// Parents always precede their children, so `nodes[n.parent]` is built
/// before `n` during expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPlan {
    root: &'static ModelDescriptor,
    nodes: Vec<PlanNode>,
}

impl RelationPlan {
    /// Resolve dotted relation names against `root`.
    ///
    /// Every prefix of a name becomes a node of its own, so `"a.b"` also
    /// loads `a`. Duplicates collapse. An unknown segment fails with
    /// [`Error::UnknownRelation`] naming the segment and the model it was
    /// looked up on.
    #[allow(clippy::result_large_err)]
    pub fn parse<I, S>(root: &'static ModelDescriptor, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes: Vec<PlanNode> = Vec::new();
        for name in names {
            let mut owner = root;
            let mut path: Vec<&'static str> = Vec::new();
            for segment in name.as_ref().split('.').map(str::trim) {
                if segment.is_empty() {
                    continue;
                }
                let relation = owner
                    .relation(segment)
                    .ok_or_else(|| Error::UnknownRelation {
                        segment: segment.to_string(),
                        model: owner.name.to_string(),
                    })?;
                path.push(relation.name);
                if !nodes.iter().any(|n| n.path == path) {
                    nodes.push(PlanNode {
                        path: path.clone(),
                        parent: None,
                        owner,
                        relation,
                    });
                }
                owner = relation.target();
            }
        }

        link_parents(&mut nodes);
        tracing::debug!(
            model = root.name,
            nodes = nodes.len(),
            "Planned relation hydration"
        );
        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> &'static ModelDescriptor {
        self.root
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merge the nodes of another plan over the same root.
    pub fn merge(mut self, other: RelationPlan) -> Self {
        for node in other.nodes {
            if !self.nodes.iter().any(|n| n.path == node.path) {
                self.nodes.push(node);
            }
        }
        link_parents(&mut self.nodes);
        self
    }
}

/// Stable-sort by depth, then point every node at its parent's index.
fn link_parents(nodes: &mut [PlanNode]) {
    nodes.sort_by_key(PlanNode::depth);
    let paths: Vec<Vec<&'static str>> = nodes.iter().map(|n| n.path.clone()).collect();
    for node in nodes.iter_mut() {
        let parent_path = &node.path[..node.path.len() - 1];
        node.parent = paths.iter().position(|p| p.as_slice() == parent_path);
    }
}

/// The root snapshot and one child spec per plan node, all resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub root: QuerySpec,
    pub children: Vec<QuerySpec>,
}

/// Build the specs that fetch `spec` and every node of `plan`.
#[tracing::instrument(level = "debug", skip(spec, plan), fields(model = plan.root().name))]
pub fn expand(spec: &QuerySpec, plan: &RelationPlan) -> Expansion {
    let config = spec.options.fetch.clone();
    let mut root = spec.resolved();
    root.options = SpecOptions::default();

    let mut children: Vec<QuerySpec> = Vec::with_capacity(plan.len());
    for node in plan.nodes() {
        let parent = match node.parent {
            Some(index) => &children[index],
            None => &root,
        };
        let child = child_spec(node, parent, &config);
        tracing::trace!(
            relation = %node.dotted(),
            table = child.source.qualifier(),
            "Expanded relation node"
        );
        children.push(child);
    }
    Expansion { root, children }
}

fn child_spec(node: &PlanNode, parent: &QuerySpec, config: &FetchConfig) -> QuerySpec {
    let target = node.relation.target();
    let table = target.table_name();
    let (local, remote) = node.relation.keys(node.owner);

    let mut on = ConditionTree::new();
    for (l, r) in local.iter().zip(remote.iter()) {
        on.add(
            Relation::And,
            ConditionKind::columns(
                format!("{table}.{l}"),
                Operator::Eq,
                format!("{}.{r}", config.join_alias),
            ),
        );
    }

    let mut child = QuerySpec::for_model(target)
        .select([format!("{table}.*")])
        .add_join(Join {
            kind: JoinKind::Inner,
            target: TableRef::query(parent.clone(), config.join_alias.clone()),
            on,
        });
    if config.distinct_children {
        child = child.distinct();
    }
    child.resolved()
}

/// Attach every child result set to its parent rows.
///
/// `child_sets[i]` holds the rows fetched for `plan.nodes()[i]`. Nodes are
/// processed deepest first so each level is complete before it is attached
/// one level up.
pub fn reconstruct(
    plan: &RelationPlan,
    mut root_rows: Vec<Row>,
    mut child_sets: Vec<Vec<Row>>,
) -> Vec<Row> {
    for index in (0..plan.len()).rev() {
        let node = &plan.nodes()[index];
        let (local, remote) = node.relation.keys(node.owner);
        let rows = std::mem::take(&mut child_sets[index]);
        let groups = group_by_key(rows, local);
        let parents = match node.parent {
            Some(parent) => &mut child_sets[parent],
            None => &mut root_rows,
        };
        attach(parents, node, remote, &groups);
        tracing::trace!(
            relation = %node.dotted(),
            groups = groups.len(),
            "Attached relation rows"
        );
    }
    root_rows
}

fn row_key(row: &Row, columns: &[&str]) -> Option<JoinKey> {
    let values = columns
        .iter()
        .map(|c| row.get(c))
        .collect::<Option<Vec<_>>>()?;
    JoinKey::composite(values)
}

fn group_by_key(rows: Vec<Row>, columns: &[&str]) -> HashMap<JoinKey, Vec<Row>> {
    let mut groups: HashMap<JoinKey, Vec<Row>> = HashMap::new();
    for row in rows {
        if let Some(key) = row_key(&row, columns) {
            groups.entry(key).or_default().push(row);
        }
    }
    groups
}

fn attach(
    parents: &mut [Row],
    node: &PlanNode,
    remote: &[&str],
    groups: &HashMap<JoinKey, Vec<Row>>,
) {
    for parent in parents {
        let matches = row_key(parent, remote).and_then(|key| groups.get(&key));
        let related = match node.relation.cardinality {
            Cardinality::One => {
                Related::One(matches.and_then(|rows| rows.first().cloned().map(Box::new)))
            }
            Cardinality::Many => Related::Many(matches.cloned().unwrap_or_default()),
        };
        parent.attach(node.name(), related);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::TrashedMode;
    use sqlweave_core::{Value, row};

    static AUTHOR: ModelDescriptor = ModelDescriptor::new("Author")
        .without_timestamps()
        .relations(&[
            RelationshipInfo::has_many("posts", post, &["author_id"]),
            RelationshipInfo::belongs_to("publisher", publisher, &["publisher_id"]),
        ]);
    static POST: ModelDescriptor = ModelDescriptor::new("Post")
        .soft_deletes()
        .relations(&[RelationshipInfo::belongs_to("author", author, &["author_id"])]);
    static PUBLISHER: ModelDescriptor = ModelDescriptor::new("Publisher").without_timestamps();

    fn author() -> &'static ModelDescriptor {
        &AUTHOR
    }
    fn post() -> &'static ModelDescriptor {
        &POST
    }
    fn publisher() -> &'static ModelDescriptor {
        &PUBLISHER
    }

    #[test]
    fn parse_adds_parents_and_sorts_by_depth() {
        let plan = RelationPlan::parse(&POST, ["author.publisher", "author"]).unwrap();
        let paths: Vec<String> = plan.nodes().iter().map(PlanNode::dotted).collect();
        assert_eq!(paths, vec!["author", "author.publisher"]);
        assert_eq!(plan.nodes()[0].parent, None);
        assert_eq!(plan.nodes()[1].parent, Some(0));
        assert_eq!(plan.nodes()[1].owner.name, "Author");
    }

    #[test]
    fn unknown_segment_names_segment_and_model() {
        let err = RelationPlan::parse(&POST, ["author.comments"]).unwrap_err();
        match err {
            Error::UnknownRelation { segment, model } => {
                assert_eq!(segment, "comments");
                assert_eq!(model, "Author");
            }
            other => panic!("expected UnknownRelation, got {other:?}"),
        }
    }

    #[test]
    fn child_specs_join_parent_snapshot() {
        let spec = QuerySpec::for_model(&AUTHOR).filter("id", 1).limit(5);
        let plan = RelationPlan::parse(&AUTHOR, ["posts"]).unwrap();
        let expansion = expand(&spec, &plan);
        assert_eq!(expansion.root.options, SpecOptions::default());

        let child = &expansion.children[0];
        assert_eq!(child.source.qualifier(), "posts");
        assert!(child.distinct);
        assert_eq!(child.trashed, TrashedMode::Include);
        // soft-deleted posts are hidden
        assert_eq!(
            child.wheres.conditions()[0].kind,
            ConditionKind::null("posts.deleted_at", false)
        );
        let join = &child.joins[0];
        assert_eq!(join.target.qualifier(), "t");
        assert_eq!(
            join.on.conditions()[0].kind,
            ConditionKind::columns("posts.author_id", Operator::Eq, "t.id")
        );
        let TableRef::Query { spec: parent, .. } = &join.target else {
            panic!("expected sub-query join");
        };
        assert_eq!(parent.limit, Some(5));
    }

    #[test]
    fn nested_children_join_previous_child() {
        let spec = QuerySpec::for_model(&POST);
        let plan = RelationPlan::parse(&POST, ["author.publisher"]).unwrap();
        let expansion = expand(&spec, &plan);
        let publisher = &expansion.children[1];
        let TableRef::Query { spec: parent, .. } = &publisher.joins[0].target else {
            panic!("expected sub-query join");
        };
        assert_eq!(parent.source.qualifier(), "authors");
        assert_eq!(
            publisher.joins[0].on.conditions()[0].kind,
            ConditionKind::columns("publishers.id", Operator::Eq, "t.publisher_id")
        );
    }

    #[test]
    fn reconstruct_groups_by_key() {
        let plan = RelationPlan::parse(&AUTHOR, ["posts"]).unwrap();
        let roots = vec![row! {"id" => 1}, row! {"id" => 2}];
        let posts = vec![
            row! {"id" => 10, "author_id" => 1},
            row! {"id" => 11, "author_id" => 1},
            row! {"id" => 12, "author_id" => Value::BigInt(3)},
        ];
        let rows = reconstruct(&plan, roots, vec![posts]);
        let ids: Vec<_> = rows[0]
            .many("posts")
            .iter()
            .map(|p| p.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![Some(Value::Int(10)), Some(Value::Int(11))]);
        assert_eq!(rows[1].relation("posts"), Some(&Related::Many(Vec::new())));
    }

    #[test]
    fn reconstruct_attaches_deepest_first() {
        let plan = RelationPlan::parse(&POST, ["author.publisher"]).unwrap();
        let posts = vec![
            row! {"id" => 1, "author_id" => 7},
            row! {"id" => 2, "author_id" => Value::Null},
        ];
        let authors = vec![row! {"id" => 7, "publisher_id" => 3}];
        let publishers = vec![row! {"id" => 3, "name" => "Acme"}];
        let rows = reconstruct(&plan, posts, vec![authors, publishers]);
        let author = rows[0].one("author").unwrap();
        let publisher = author.one("publisher").unwrap();
        assert_eq!(publisher.get("name"), Some(&Value::from("Acme")));
        assert_eq!(rows[1].relation("author"), Some(&Related::One(None)));
    }
}
