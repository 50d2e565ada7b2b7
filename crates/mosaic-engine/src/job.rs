use mosaic_comm::Message;
use serde::{Deserialize, Serialize};

/// One unit of backward color propagation, routed to the partition owning
/// its destination node.
///
/// A closed union: the message set of the whole engine is fixed here and
/// matched exhaustively, so an unrecognized message cannot exist by
/// construction. Transports that serialize use the serde impls; the
/// in-memory transport moves values directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Job<N, C> {
    /// `colors` have been pushed into `node` for an exists-next phase.
    ExistsNext { node: N, colors: C },
    /// `colors` have been pushed into `node` for an exists-until phase.
    ExistsUntil { node: N, colors: C },
    /// `colors` have been pushed into `target` along the edge
    /// `target -> source`. The edge identity matters: all-until tracks
    /// coverage of every outgoing edge of `target`.
    AllUntil { source: N, target: N, colors: C },
}

/// Discriminants of [`Job`]; one communication phase accepts exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    ExistsNext,
    ExistsUntil,
    AllUntil,
}

impl<N, C> Job<N, C> {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::ExistsNext { .. } => JobKind::ExistsNext,
            Job::ExistsUntil { .. } => JobKind::ExistsUntil,
            Job::AllUntil { .. } => JobKind::AllUntil,
        }
    }

    /// The node whose owning partition must process this job.
    pub fn destination(&self) -> &N {
        match self {
            Job::ExistsNext { node, .. } => node,
            Job::ExistsUntil { node, .. } => node,
            Job::AllUntil { target, .. } => target,
        }
    }
}

impl<N, C> Message for Job<N, C>
where
    N: std::fmt::Debug + Send + 'static,
    C: std::fmt::Debug + Send + 'static,
{
    type Kind = JobKind;

    fn kind(&self) -> JobKind {
        Job::kind(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_graph::{IdColors, IdNode};

    #[test]
    fn destination_routes_to_the_target() {
        let job = Job::AllUntil {
            source: IdNode(1),
            target: IdNode(2),
            colors: IdColors::of([1]),
        };
        assert_eq!(*job.destination(), IdNode(2));
        assert_eq!(job.kind(), JobKind::AllUntil);

        let job = Job::ExistsUntil {
            node: IdNode(7),
            colors: IdColors::of([2]),
        };
        assert_eq!(*job.destination(), IdNode(7));
        assert_eq!(job.kind(), JobKind::ExistsUntil);
    }
}
