//! Candidate certification paths, from a leaf through untrusted
//! intermediates up to a trust anchor.

use x509_cert::Certificate;

use super::policy;

/// Longest path considered, anchor included.
pub const MAX_PATH_LENGTH: usize = 10;

/// Upper bound on the number of candidate paths.
pub const MAX_CANDIDATE_PATHS: usize = 16;

/// Upper bound on the intermediates examined while searching, across all
/// branches.
pub const MAX_VISITED: usize = 128;

/// A certification path, leaf first. The last certificate is always a trust
/// anchor.
pub type Path<'a> = Vec<&'a Certificate>;

fn issued_by(cert: &Certificate, issuer: &Certificate) -> bool {
    cert.tbs_certificate.issuer == issuer.tbs_certificate.subject
}

/// Every path from `leaf` to one of `roots` that can be built by matching
/// issuer and subject names.
///
/// Intermediates whose key provably did not sign the certificate below them
/// are pruned. Other signature problems are left to the path policies, as
/// are all checks on the last hop to the anchor.
///
/// A leaf that is itself a trusted root yields the one-element path. Fails
/// once more than [`MAX_VISITED`] intermediates have been examined.
pub fn candidate_paths<'a>(
    leaf: &'a Certificate,
    intermediates: &'a [Certificate],
    roots: &'a [Certificate],
) -> Result<Vec<Path<'a>>, String> {
    // copies of trusted roots are reached through `roots`
    let mut pool: Vec<&Certificate> = Vec::with_capacity(intermediates.len());
    for cert in intermediates {
        if !roots.contains(cert) && !pool.contains(&cert) {
            pool.push(cert);
        }
    }
    let mut search = Search {
        pool,
        roots,
        paths: Vec::new(),
        visited: 0,
    };
    search.extend(&mut vec![leaf])?;
    Ok(search.paths)
}

struct Search<'a> {
    pool: Vec<&'a Certificate>,
    roots: &'a [Certificate],
    paths: Vec<Path<'a>>,
    visited: usize,
}

impl<'a> Search<'a> {
    fn extend(&mut self, path: &mut Path<'a>) -> Result<(), String> {
        let roots = self.roots;
        let current = match path.last() {
            Some(current) => *current,
            None => return Ok(()),
        };
        if self.paths.len() >= MAX_CANDIDATE_PATHS {
            return Ok(());
        }
        if path.len() == 1 && roots.contains(current) {
            self.paths.push(path.clone());
            return Ok(());
        }
        if path.len() >= MAX_PATH_LENGTH {
            return Ok(());
        }
        for root in roots.iter().filter(|root| issued_by(current, root)) {
            let mut complete = path.clone();
            complete.push(root);
            self.paths.push(complete);
        }
        for i in 0..self.pool.len() {
            let issuer = self.pool[i];
            if !issued_by(current, issuer) || path.contains(&issuer) {
                continue;
            }
            self.visited += 1;
            if self.visited > MAX_VISITED {
                return Err("path search limit exceeded".to_string());
            }
            if let Ok(false) = policy::verify_signature(current, issuer) {
                continue;
            }
            path.push(issuer);
            self.extend(path)?;
            path.pop();
        }
        Ok(())
    }
}
