use {
    crate::{Error, Result},
    serde::Serialize,
    std::ops::Range,
};

/// Largest number of processes that can share memory.
pub const PSHM_MAX_NODES: u32 = 255;

/// Host and supernode of a rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NodeInfo
{
    /// Index of the host among all hosts.
    pub host: u32,

    /// Index of the supernode among all supernodes.
    pub supernode: u32,
}

/// Position of this process in a level of grouping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeGroup
{
    /// Number of processes in my group.
    pub node_count: u32,

    /// My rank within my group.
    pub node_rank: u32,

    /// Number of groups in the job.
    pub grp_count: u32,

    /// Rank of my group among all groups.
    pub grp_rank: u32,
}

/// Layout of the job as seen from one process.
#[derive(Clone, Debug, Serialize)]
pub struct Topology
{
    rank: u32,
    nodemap: Vec<u32>,
    nodeinfo: Vec<NodeInfo>,
    host_nodes: Vec<u32>,
    supernode_nodes: Range<usize>,

    /// Grouping by host.
    pub host: NodeGroup,

    /// Grouping by supernode.
    pub supernode: NodeGroup,

    /// Supernodes on my host: their count, and the rank of mine.
    pub nbrhd_on_host: (u32, u32),
}

impl Topology
{
    /// Rank of this process.
    pub fn rank(&self) -> u32
    {
        self.rank
    }

    /// Number of processes.
    pub fn size(&self) -> u32
    {
        self.nodemap.len() as u32
    }

    /// Leader of the supernode of every rank.
    pub fn nodemap(&self) -> &[u32]
    {
        &self.nodemap
    }

    /// Host and supernode of every rank.
    pub fn nodeinfo(&self) -> &[NodeInfo]
    {
        &self.nodeinfo
    }

    /// Ranks on my host, in ascending order.
    pub fn host_nodes(&self) -> &[u32]
    {
        &self.host_nodes
    }

    /// Ranks in my supernode, in ascending order.
    pub fn supernode_nodes(&self) -> &[u32]
    {
        &self.host_nodes[self.supernode_nodes.clone()]
    }
}

/// Determine the supernode size limit.
///
/// Without shared memory every process is its own supernode.
/// Otherwise `maxsize` caps the size, and zero or less means no cap.
pub fn supernode_limit(maxsize: i64, pshm: bool) -> Result<u32>
{
    if !pshm {
        return Ok(1);
    }
    if maxsize <= 0 {
        return Ok(PSHM_MAX_NODES);
    }
    if maxsize > i64::from(PSHM_MAX_NODES) {
        return Err(Error::Config(format!(
            "SUPERNODE_MAXSIZE {} exceeds PSHM max ({})", maxsize, PSHM_MAX_NODES,
        )));
    }
    Ok(maxsize as u32)
}

#[derive(Clone, Copy, Default)]
struct Scratch
{
    width: u32,
    h_lead: u32,
    sn_lead: u32,
    host: u32,
    supernode: u32,
}

/// Derive hosts and supernodes from a nodemap.
///
/// Every host is split into supernodes of at most `limit` processes,
/// in rank order. The returned nodemap maps every rank to the
/// lowest rank of its supernode.
pub fn parse(mut nodemap: Vec<u32>, rank: u32, limit: u32) -> Topology
{
    let size = nodemap.len();
    let me = rank as usize;
    let limit = limit.max(1);
    debug_assert_eq!(nodemap.first(), Some(&0));
    debug_assert!(nodemap[me] <= rank);

    let mut s = vec![Scratch::default(); size];
    let mut nodeinfo = Vec::with_capacity(size);
    let mut host = NodeGroup::default();
    let mut supernode = NodeGroup::default();

    let initial = nodemap[me] as usize;
    for i in 0 .. size {
        let n = nodemap[i] as usize;
        let width = s[n].width;
        s[n].width += 1;
        let lrank = width % limit;
        if width == 0 {
            s[n].host = host.grp_count;
            host.grp_count += 1;
        }
        if lrank == 0 {
            s[n].sn_lead = i as u32;
            s[n].supernode = supernode.grp_count;
            supernode.grp_count += 1;
        }
        if i == me {
            supernode.node_rank = lrank;
            host.node_rank = width;
        }
        s[i].h_lead = n as u32;
        nodemap[i] = s[n].sn_lead;
        nodeinfo.push(NodeInfo{host: s[n].host, supernode: s[n].supernode});
    }

    let last = nodemap[me];
    let width = s[initial].width;
    supernode.node_count =
        if last == s[initial].sn_lead { (width - 1) % limit + 1 } else { limit };
    host.node_count = width;
    supernode.grp_rank = nodeinfo[me].supernode;
    host.grp_rank = nodeinfo[me].host;

    let mut host_nodes = Vec::with_capacity(host.node_count as usize);
    let mut sn_start = 0;
    for i in initial .. size {
        if host_nodes.len() == host.node_count as usize {
            break;
        }
        if s[i].h_lead as usize == initial {
            if i as u32 == last {
                sn_start = host_nodes.len();
            }
            host_nodes.push(i as u32);
        }
    }
    let supernode_nodes = sn_start .. sn_start + supernode.node_count as usize;

    let mut nbrhd_count = 0;
    let mut nbrhd_rank = 0;
    for &j in &host_nodes {
        if nodemap[j as usize] == j {
            nbrhd_count += 1;
            if j <= rank {
                nbrhd_rank += 1;
            }
        }
    }
    let nbrhd_on_host = (nbrhd_count, nbrhd_rank - 1);

    tracing::debug!(
        "nodemap: process {} of {} in its nbrhd, {} of {} on its host",
        supernode.node_rank, supernode.node_count, host.node_rank, host.node_count,
    );
    tracing::debug!(
        "nodemap: nbrhd {} of {} in the job, {} of {} on its host",
        supernode.grp_rank, supernode.grp_count, nbrhd_on_host.1, nbrhd_on_host.0,
    );
    tracing::debug!("nodemap: host {} of {}", host.grp_rank, host.grp_count);

    Topology{
        rank,
        nodemap,
        nodeinfo,
        host_nodes,
        supernode_nodes,
        host,
        supernode,
        nbrhd_on_host,
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::nodemap::{Keys, build_exact}, proptest::{collection::vec, proptest}};

    #[test]
    fn two_hosts_of_two()
    {
        let topology = parse(vec![0, 0, 2, 2], 3, PSHM_MAX_NODES);
        assert_eq!(topology.nodemap(), &[0, 0, 2, 2]);
        assert_eq!(topology.host, NodeGroup{node_count: 2, node_rank: 1, grp_count: 2, grp_rank: 1});
        assert_eq!(topology.supernode, topology.host);
        assert_eq!(topology.host_nodes(), &[2, 3]);
        assert_eq!(topology.supernode_nodes(), &[2, 3]);
        assert_eq!(topology.nodeinfo()[1], NodeInfo{host: 0, supernode: 0});
        assert_eq!(topology.nbrhd_on_host, (1, 0));
    }

    #[test]
    fn supernode_split()
    {
        let topology = parse(vec![0; 5], 3, 2);
        assert_eq!(topology.nodemap(), &[0, 0, 2, 2, 4]);
        assert_eq!(topology.host, NodeGroup{node_count: 5, node_rank: 3, grp_count: 1, grp_rank: 0});
        assert_eq!(topology.supernode, NodeGroup{node_count: 2, node_rank: 1, grp_count: 3, grp_rank: 1});
        assert_eq!(topology.host_nodes(), &[0, 1, 2, 3, 4]);
        assert_eq!(topology.supernode_nodes(), &[2, 3]);
        assert_eq!(topology.nbrhd_on_host, (3, 1));

        let last = parse(vec![0; 5], 4, 2);
        assert_eq!(last.supernode.node_count, 1);
        assert_eq!(last.supernode_nodes(), &[4]);
    }

    #[test]
    fn no_pshm()
    {
        let topology = parse(vec![0, 0, 2, 2], 1, supernode_limit(7, false).unwrap());
        assert_eq!(topology.nodemap(), &[0, 1, 2, 3]);
        assert_eq!(topology.host.grp_count, 2);
        assert_eq!(topology.supernode.grp_count, 4);
        assert_eq!(topology.supernode_nodes(), &[1]);
    }

    #[test]
    fn limits()
    {
        assert_eq!(supernode_limit(0, true).unwrap(), PSHM_MAX_NODES);
        assert_eq!(supernode_limit(-3, true).unwrap(), PSHM_MAX_NODES);
        assert_eq!(supernode_limit(16, true).unwrap(), 16);
        assert_eq!(supernode_limit(1000, false).unwrap(), 1);
        assert_eq!(
            supernode_limit(1000, true).unwrap_err().to_string(),
            "SUPERNODE_MAXSIZE 1000 exceeds PSHM max (255)",
        );
    }

    proptest!
    {
        #[test]
        fn groups_are_consistent(
            bytes in vec(0u8 .. 4, 1 .. 40),
            rank_seed: usize,
            limit in 1u32 .. 5,
        )
        {
            let size = bytes.len();
            let rank = (rank_seed % size) as u32;
            let keys = Keys::new(&bytes, size, 1, 1).unwrap();
            let topology = parse(build_exact(&keys), rank, limit);

            let nodemap = topology.nodemap();
            for (i, &n) in nodemap.iter().enumerate() {
                assert_eq!(nodemap[n as usize], n);
                assert_eq!(bytes[i], bytes[n as usize]);
            }

            let host = topology.host_nodes();
            assert_eq!(host.len(), topology.host.node_count as usize);
            assert!(host.iter().all(|&j| bytes[j as usize] == bytes[rank as usize]));
            assert_eq!(host[topology.host.node_rank as usize], rank);

            let sn = topology.supernode_nodes();
            assert!(sn.len() as u32 <= limit);
            assert!(sn.iter().all(|&j| nodemap[j as usize] == nodemap[rank as usize]));
            assert_eq!(sn[topology.supernode.node_rank as usize], rank);

            let info = topology.nodeinfo();
            assert!(info.iter().all(|i| i.host < topology.host.grp_count));
            assert!(info.iter().all(|i| i.supernode < topology.supernode.grp_count));
        }
    }
}
